use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use derive_more::Display;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::envelope::Envelope;
use crate::error::EventLogError;

/// Identifies a live [`EventLog::subscribe_filtered`] registration so it can
/// later be torn down with [`EventLog::unsubscribe_by_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("sub-{_0}")]
pub struct SubscriptionId(u64);

/// Extra predicate applied on top of the event-type filter, e.g. matching on
/// a specific `run_id` carried in the envelope.
pub type EnvelopeFilter = Arc<dyn Fn(&Envelope) -> bool + Send + Sync>;

/// Receives envelopes delivered by a filtered subscription, in the order
/// they were appended.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, offset: i64, envelope: &Envelope);
}

/// Append-only log of [`Envelope`]s with ordered replay and subscriber
/// fan-out. `append` commits the event before dispatch is attempted, so a
/// subscriber failure can never roll back or block the write.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, envelope: Envelope) -> Result<i64, EventLogError>;

    fn read_from(&self, offset: i64, limit: usize) -> Vec<(i64, Envelope)>;

    fn subscribe_filtered(
        &self,
        event_types: Vec<String>,
        handler: Arc<dyn EventHandler>,
        filter: Option<EnvelopeFilter>,
    ) -> SubscriptionId;

    /// No-op if `id` is unknown, so callers never need to guard the call.
    fn unsubscribe_by_id(&self, id: SubscriptionId);

    fn get_latest_offset(&self) -> i64;

    /// Configured retention window; an external reaper decides when and how
    /// to prune, the log itself never deletes committed events.
    fn retention_days(&self) -> u32;
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    event_types: Vec<String>,
    filter: Option<EnvelopeFilter>,
    handler: Arc<dyn EventHandler>,
}

impl Subscription {
    fn matches(&self, envelope: &Envelope) -> bool {
        let type_matches = self
            .event_types
            .iter()
            .any(|t| t == "*" || t == &envelope.event_type);
        if !type_matches {
            return false;
        }
        self.filter.as_ref().is_none_or(|f| f(envelope))
    }
}

#[derive(Debug)]
pub struct EventLogConfig {
    pub max_payload_bytes: usize,
    pub retention_days: u32,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 256 * 1024,
            retention_days: 30,
        }
    }
}

/// In-process event log backed by a `Vec`, suitable for tests and for
/// single-process deployments that don't need durability across restarts.
#[allow(missing_debug_implementations)]
pub struct InMemoryEventLog {
    events: Mutex<Vec<Envelope>>,
    subscriptions: Mutex<Vec<Subscription>>,
    next_subscription_id: AtomicU64,
    config: EventLogConfig,
}

impl InMemoryEventLog {
    pub fn new(config: EventLogConfig) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            next_subscription_id: AtomicU64::new(0),
            config,
        }
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new(EventLogConfig::default())
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, envelope: Envelope) -> Result<i64, EventLogError> {
        let payload_len = serde_json::to_vec(&envelope.payload)
            .map_err(|e| EventLogError::StorageFailure(e.to_string()))?
            .len();
        if payload_len > self.config.max_payload_bytes {
            return Err(EventLogError::PayloadTooLarge {
                actual: payload_len,
                limit: self.config.max_payload_bytes,
            });
        }

        let offset = {
            let mut events = self.events.lock();
            let offset = events.len() as i64;
            events.push(envelope.clone());
            offset
        };

        // Dispatch after commit, and outside the storage lock: a subscriber
        // is free to call back into the log (e.g. to append a derived
        // event) without deadlocking.
        let subscribers: Vec<Subscription> = self.subscriptions.lock().clone();
        for sub in subscribers.iter().filter(|s| s.matches(&envelope)) {
            let dispatch = AssertUnwindSafe(sub.handler.handle(offset, &envelope)).catch_unwind();
            if let Err(panic) = dispatch.await {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!(subscriber = %sub.id, offset, reason, "event log subscriber panicked; continuing dispatch");
            }
        }

        Ok(offset)
    }

    fn read_from(&self, offset: i64, limit: usize) -> Vec<(i64, Envelope)> {
        let events = self.events.lock();
        let start = if offset < 0 { 0 } else { (offset + 1) as usize };
        events
            .iter()
            .enumerate()
            .skip(start)
            .take(limit)
            .map(|(i, e)| (i as i64, e.clone()))
            .collect()
    }

    fn subscribe_filtered(
        &self,
        event_types: Vec<String>,
        handler: Arc<dyn EventHandler>,
        filter: Option<EnvelopeFilter>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::SeqCst));
        self.subscriptions.lock().push(Subscription {
            id,
            event_types,
            filter,
            handler,
        });
        id
    }

    fn unsubscribe_by_id(&self, id: SubscriptionId) {
        self.subscriptions.lock().retain(|s| s.id != id);
    }

    fn get_latest_offset(&self) -> i64 {
        self.events.lock().len() as i64 - 1
    }

    fn retention_days(&self) -> u32 {
        self.config.retention_days
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeKind;
    use parking_lot::Mutex as StdMutex;
    use serde_json::json;

    struct RecordingHandler {
        seen: Arc<StdMutex<Vec<i64>>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, offset: i64, _envelope: &Envelope) {
            self.seen.lock().push(offset);
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl EventHandler for PanickingHandler {
        async fn handle(&self, _offset: i64, _envelope: &Envelope) {
            panic!("boom");
        }
    }

    fn envelope(event_type: &str) -> Envelope {
        Envelope::new(EnvelopeKind::Event, event_type, "test.producer", json!({}))
    }

    #[tokio::test]
    async fn offsets_are_monotonic_and_gap_free() {
        let log = InMemoryEventLog::default();
        for i in 0..5 {
            let offset = log.append(envelope("test.Tick")).await.unwrap();
            assert_eq!(offset, i);
        }
        assert_eq!(log.get_latest_offset(), 4);
    }

    #[tokio::test]
    async fn read_from_is_exclusive_of_the_given_offset() {
        let log = InMemoryEventLog::default();
        for _ in 0..3 {
            log.append(envelope("test.Tick")).await.unwrap();
        }
        let page = log.read_from(0, 10);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].0, 1);
    }

    #[tokio::test]
    async fn filtered_subscription_only_sees_matching_types() {
        let log = InMemoryEventLog::default();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        log.subscribe_filtered(
            vec!["orders.Placed".to_string()],
            Arc::new(RecordingHandler { seen: seen.clone() }),
            None,
        );

        log.append(envelope("strategy.FetchWindow")).await.unwrap();
        log.append(envelope("orders.Placed")).await.unwrap();

        assert_eq!(*seen.lock(), vec![1]);
    }

    #[tokio::test]
    async fn one_subscriber_panicking_does_not_block_another() {
        let log = InMemoryEventLog::default();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        log.subscribe_filtered(vec!["*".to_string()], Arc::new(PanickingHandler), None);
        log.subscribe_filtered(
            vec!["*".to_string()],
            Arc::new(RecordingHandler { seen: seen.clone() }),
            None,
        );

        let offset = log.append(envelope("test.Tick")).await.unwrap();

        assert_eq!(*seen.lock(), vec![offset]);
    }

    #[tokio::test]
    async fn unsubscribe_is_a_no_op_for_unknown_id() {
        let log = InMemoryEventLog::default();
        log.unsubscribe_by_id(SubscriptionId(999));
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected_before_commit() {
        let log = InMemoryEventLog::new(EventLogConfig {
            max_payload_bytes: 8,
            retention_days: 1,
        });
        let mut big = Envelope::new(EnvelopeKind::Event, "test.TooBig", "test.producer", json!({}));
        big.payload = json!({"data": "this payload is far larger than eight bytes"});
        let err = log.append(big).await.expect_err("payload exceeds limit");
        assert!(matches!(err, EventLogError::PayloadTooLarge { .. }));
        assert_eq!(log.get_latest_offset(), -1);
    }
}
