use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("no connected adapter for this run")]
    NotConnected,

    #[error("order {0} not found")]
    NotFound(String),

    #[error("adapter call timed out after {0:?}")]
    TransportTimeout(Duration),

    #[error("adapter rejected the request: {0}")]
    AdapterRejected(String),

    #[error("order repository failure: {0}")]
    StorageFailure(String),
}
