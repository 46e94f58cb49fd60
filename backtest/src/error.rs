use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("invalid backtest configuration: {0}")]
    ValidationError(String),

    #[error("event log failure: {0}")]
    StorageFailure(String),
}
