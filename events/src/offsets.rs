use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

/// Tracks how far each named consumer has progressed through an
/// [`crate::log::EventLog`], so it can resume from where it left off after a
/// restart instead of replaying from the beginning.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Last offset the consumer acknowledged, or `-1` if it has never run.
    async fn get_offset(&self, consumer_id: &str) -> i64;

    async fn set_offset(&self, consumer_id: &str, offset: i64);

    async fn get_all_offsets(&self) -> HashMap<String, i64>;
}

#[derive(Debug, Default)]
pub struct InMemoryOffsetStore {
    offsets: Mutex<HashMap<String, i64>>,
}

impl InMemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OffsetStore for InMemoryOffsetStore {
    async fn get_offset(&self, consumer_id: &str) -> i64 {
        *self.offsets.lock().get(consumer_id).unwrap_or(&-1)
    }

    async fn set_offset(&self, consumer_id: &str, offset: i64) {
        self.offsets.lock().insert(consumer_id.to_string(), offset);
    }

    async fn get_all_offsets(&self) -> HashMap<String, i64> {
        self.offsets.lock().clone()
    }
}
