use chrono::{DateTime, Utc};
use derive_more::Display;
use engine_integration::collection::FnvIndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `evt` for facts that already happened, `cmd` for requests that a
/// downstream service is expected to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    #[display("evt")]
    Event,
    #[display("cmd")]
    Command,
}

/// The single wire format every message on the log is wrapped in.
///
/// `type` is a dotted string such as `"strategy.FetchWindow"` or
/// `"orders.Placed"`; consumers match on it verbatim, there is no closed
/// enum of event types at this layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub kind: EnvelopeKind,
    #[serde(rename = "type")]
    pub event_type: String,
    pub version: String,
    pub run_id: Option<Uuid>,
    pub corr_id: Uuid,
    pub causation_id: Option<Uuid>,
    pub trace_id: Option<Uuid>,
    pub ts: DateTime<Utc>,
    pub producer: String,
    #[serde(default)]
    pub headers: FnvIndexMap<String, String>,
    pub payload: serde_json::Value,
}

impl Envelope {
    /// Build a root envelope: no causation, a fresh correlation id.
    pub fn new(
        kind: EnvelopeKind,
        event_type: impl Into<String>,
        producer: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            event_type: event_type.into(),
            version: "1".to_string(),
            run_id: None,
            corr_id: Uuid::new_v4(),
            causation_id: None,
            trace_id: None,
            ts: Utc::now(),
            producer: producer.into(),
            headers: FnvIndexMap::default(),
            payload,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_trace_id(mut self, trace_id: Uuid) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Derive a new envelope caused by this one: same `run_id`/`corr_id`/
    /// `trace_id`, a fresh id, and `causation_id` pointing back at `self`.
    pub fn derive(
        &self,
        kind: EnvelopeKind,
        event_type: impl Into<String>,
        producer: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            event_type: event_type.into(),
            version: self.version.clone(),
            run_id: self.run_id,
            corr_id: self.corr_id,
            causation_id: Some(self.id),
            trace_id: self.trace_id,
            ts: Utc::now(),
            producer: producer.into(),
            headers: FnvIndexMap::default(),
            payload,
        }
    }
}

/// A committed envelope paired with the offset it was assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub offset: i64,
    pub envelope: Envelope,
}
