use thiserror::Error;
use uuid::Uuid;

use crate::run::RunStatus;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{0}")]
    ValidationError(String),
    #[error("run {0} not found")]
    NotFound(Uuid),
    #[error("illegal transition: run {0} is {1:?}")]
    IllegalTransition(Uuid, RunStatus),
    #[error("run repository failure: {0}")]
    StorageFailure(String),
    #[error("run {0} failed: {1}")]
    RunFailure(Uuid, String),
}
