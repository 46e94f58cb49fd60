use thiserror::Error;

/// Failure modes of appending to or reading from an [`crate::log::EventLog`].
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("envelope payload of {actual} bytes exceeds the {limit}-byte limit")]
    PayloadTooLarge { actual: usize, limit: usize },

    #[error("event log storage failure: {0}")]
    StorageFailure(String),
}
