use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("strategy panicked: {0}")]
    Panicked(String),
    #[error("failed to decode event payload: {0}")]
    ValidationError(String),
    #[error("event log failure: {0}")]
    StorageFailure(String),
}
