use std::sync::Arc;

use async_trait::async_trait;
use engine_events::{Envelope, EnvelopeKind, EventHandler, EventLog};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const PRODUCER: &str = "glados.router";

/// A run's execution mode, as seen by the router. Paper and live both route
/// to `live.*`; only backtest gets its own domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Backtest,
    Paper,
    Live,
}

impl RunMode {
    fn domain_prefix(self) -> &'static str {
        match self {
            RunMode::Backtest => "backtest",
            RunMode::Paper | RunMode::Live => "live",
        }
    }
}

/// How the router looks up a run's mode. Implemented by the run registry;
/// kept as a trait here so this crate never depends on the orchestrator.
pub trait RunModeLookup: Send + Sync {
    fn mode_of(&self, run_id: Uuid) -> Option<RunMode>;
}

fn translate_suffix(event_type: &str) -> Option<&'static str> {
    match event_type {
        "strategy.FetchWindow" => Some("FetchWindow"),
        "strategy.PlaceRequest" => Some("PlaceOrder"),
        _ => None,
    }
}

/// The single in-process subscriber to `strategy.*`. Rewrites mode-neutral
/// events into `backtest.*` or `live.*` ones, preserving the payload and
/// correlation chain verbatim.
#[allow(missing_debug_implementations)]
pub struct DomainRouter {
    runs: Arc<dyn RunModeLookup>,
    event_log: Arc<dyn EventLog>,
}

impl DomainRouter {
    pub fn new(runs: Arc<dyn RunModeLookup>, event_log: Arc<dyn EventLog>) -> Self {
        Self { runs, event_log }
    }

    pub fn subscribe(self: &Arc<Self>) {
        let handler: Arc<dyn EventHandler> = self.clone();
        self.event_log.subscribe_filtered(vec!["*".to_string()], handler, None);
    }

    async fn route(&self, source: &Envelope) {
        let Some(run_id) = source.run_id else { return };
        let Some(mode) = self.runs.mode_of(run_id) else { return };
        let Some(suffix) = translate_suffix(&source.event_type) else { return };

        let routed_type = format!("{}.{}", mode.domain_prefix(), suffix);
        let envelope = source.derive(EnvelopeKind::Event, routed_type, PRODUCER, source.payload.clone());
        if let Err(err) = self.event_log.append(envelope).await {
            tracing::error!(run_id = %run_id, event_type = %source.event_type, error = %err, "domain router failed to append routed event");
        }
    }
}

#[async_trait]
impl EventHandler for DomainRouter {
    async fn handle(&self, _offset: i64, envelope: &Envelope) {
        if envelope.event_type.starts_with("strategy.") {
            self.route(envelope).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_events::InMemoryEventLog;
    use std::collections::HashMap;

    struct FakeRuns(HashMap<Uuid, RunMode>);

    impl RunModeLookup for FakeRuns {
        fn mode_of(&self, run_id: Uuid) -> Option<RunMode> {
            self.0.get(&run_id).copied()
        }
    }

    #[tokio::test]
    async fn backtest_run_routes_to_the_backtest_domain_preserving_the_chain() {
        let run_id = Uuid::new_v4();
        let log = Arc::new(InMemoryEventLog::default());
        let runs = Arc::new(FakeRuns(HashMap::from([(run_id, RunMode::Backtest)])));
        let router = Arc::new(DomainRouter::new(runs, log.clone()));
        router.subscribe();

        let source = Envelope::new(EnvelopeKind::Event, "strategy.FetchWindow", "marvin.runner", serde_json::json!({"symbol": "AAPL"}))
            .with_run_id(run_id);
        let source_id = source.id;
        let corr_id = source.corr_id;
        log.append(source).await.unwrap();

        let page = log.read_from(-1, 10);
        let routed = page.iter().find(|(_, e)| e.event_type == "backtest.FetchWindow").unwrap();
        assert_eq!(routed.1.producer, "glados.router");
        assert_eq!(routed.1.corr_id, corr_id);
        assert_eq!(routed.1.causation_id, Some(source_id));
    }

    #[tokio::test]
    async fn paper_and_live_both_route_to_the_live_domain() {
        for mode in [RunMode::Paper, RunMode::Live] {
            let run_id = Uuid::new_v4();
            let log = Arc::new(InMemoryEventLog::default());
            let runs = Arc::new(FakeRuns(HashMap::from([(run_id, mode)])));
            let router = Arc::new(DomainRouter::new(runs, log.clone()));
            router.subscribe();

            let source = Envelope::new(EnvelopeKind::Event, "strategy.PlaceRequest", "marvin.runner", serde_json::json!({}))
                .with_run_id(run_id);
            log.append(source).await.unwrap();

            let page = log.read_from(-1, 10);
            assert!(page.iter().any(|(_, e)| e.event_type == "live.PlaceOrder"));
        }
    }

    #[tokio::test]
    async fn an_unknown_run_id_is_dropped_silently() {
        let log = Arc::new(InMemoryEventLog::default());
        let runs = Arc::new(FakeRuns(HashMap::new()));
        let router = Arc::new(DomainRouter::new(runs, log.clone()));
        router.subscribe();

        let source = Envelope::new(EnvelopeKind::Event, "strategy.FetchWindow", "marvin.runner", serde_json::json!({}))
            .with_run_id(Uuid::new_v4());
        log.append(source).await.unwrap();

        let page = log.read_from(-1, 10);
        assert_eq!(page.len(), 1, "only the original event, nothing routed");
    }
}
