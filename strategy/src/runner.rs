use std::sync::Arc;

use async_trait::async_trait;
use engine_events::{Envelope, EnvelopeKind, EventHandler, EventLog, SubscriptionId, Tick};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::action::Action;
use crate::error::StrategyError;
use crate::strategy::Strategy;

const PRODUCER: &str = "marvin.runner";

/// Binds one [`Strategy`] instance to one run. Owns the strategy and the
/// subscription handle it holds on the Event Log for `data.WindowReady`.
#[allow(missing_debug_implementations)]
pub struct StrategyRunner {
    run_id: Uuid,
    strategy: Arc<dyn Strategy>,
    event_log: Arc<dyn EventLog>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl StrategyRunner {
    pub fn new(run_id: Uuid, strategy: Arc<dyn Strategy>, event_log: Arc<dyn EventLog>) -> Self {
        Self {
            run_id,
            strategy,
            event_log,
            subscription: Mutex::new(None),
        }
    }

    /// Subscribes to `data.WindowReady` filtered to this run and calls
    /// `strategy.initialize(symbols)`.
    pub async fn initialize(self: &Arc<Self>, symbols: &[String]) {
        let handler: Arc<dyn EventHandler> = self.clone();
        let run_id = self.run_id;
        let id = self.event_log.subscribe_filtered(
            vec!["data.WindowReady".to_string()],
            handler,
            Some(Arc::new(move |envelope: &Envelope| envelope.run_id == Some(run_id))),
        );
        *self.subscription.lock() = Some(id);
        self.strategy.initialize(symbols).await;
    }

    /// Invokes the strategy for a clock tick and emits its actions.
    pub async fn on_tick(&self, tick: &Tick) -> Result<(), StrategyError> {
        let actions = self.strategy.on_tick(tick).await;
        self.emit_actions(actions, None).await
    }

    async fn handle_window_ready(&self, source: &Envelope) -> Result<(), StrategyError> {
        let actions = self.strategy.on_data(&source.payload).await;
        self.emit_actions(actions, Some(source)).await
    }

    /// Appends one envelope per action, each on its own freshly-chosen
    /// correlation chain so responses can be grouped by action.
    async fn emit_actions(&self, actions: Vec<Action>, causation: Option<&Envelope>) -> Result<(), StrategyError> {
        for action in actions {
            let mut envelope = Envelope::new(EnvelopeKind::Event, action.event_type(), PRODUCER, action.to_payload())
                .with_run_id(self.run_id);
            if let Some(source) = causation {
                envelope.trace_id = source.trace_id;
            }
            self.event_log
                .append(envelope)
                .await
                .map_err(|e| StrategyError::StorageFailure(e.to_string()))?;
        }
        Ok(())
    }

    /// Unsubscribes from the Event Log. Idempotent.
    pub fn cleanup(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.event_log.unsubscribe_by_id(id);
        }
    }
}

#[async_trait]
impl EventHandler for StrategyRunner {
    async fn handle(&self, _offset: i64, envelope: &Envelope) {
        if let Err(err) = self.handle_window_ready(envelope).await {
            tracing::error!(run_id = %self.run_id, error = %err, "strategy runner failed to handle data.WindowReady");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_events::InMemoryEventLog;
    use parking_lot::Mutex as SyncMutex;

    struct EchoStrategy {
        initialized_with: SyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl Strategy for EchoStrategy {
        async fn initialize(&self, symbols: &[String]) {
            *self.initialized_with.lock() = symbols.to_vec();
        }

        async fn on_tick(&self, _tick: &Tick) -> Vec<Action> {
            vec![Action::FetchWindow { symbol: "AAPL".to_string(), lookback: 5 }]
        }

        async fn on_data(&self, _payload: &serde_json::Value) -> Vec<Action> {
            vec![Action::PlaceOrder {
                symbol: "AAPL".to_string(),
                side: engine_execution::Side::Buy,
                qty: rust_decimal::Decimal::TEN,
                order_type: engine_execution::OrderType::Market,
                limit_price: None,
                stop_price: None,
            }]
        }
    }

    fn tick(run_id: Uuid) -> Tick {
        Tick { run_id, ts: chrono::Utc::now(), timeframe: engine_events::Timeframe::M1, bar_index: 0, is_backtest: true }
    }

    #[tokio::test]
    async fn on_tick_emits_one_strategy_fetch_window_event() {
        let run_id = Uuid::new_v4();
        let log = Arc::new(InMemoryEventLog::default());
        let strategy = Arc::new(EchoStrategy { initialized_with: SyncMutex::new(Vec::new()) });
        let runner = Arc::new(StrategyRunner::new(run_id, strategy, log.clone()));
        runner.initialize(&["AAPL".to_string()]).await;

        runner.on_tick(&tick(run_id)).await.unwrap();

        let page = log.read_from(-1, 10);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].1.event_type, "strategy.FetchWindow");
        assert_eq!(page[0].1.run_id, Some(run_id));
    }

    #[tokio::test]
    async fn data_window_ready_for_this_run_triggers_on_data_and_a_new_action() {
        let run_id = Uuid::new_v4();
        let other_run = Uuid::new_v4();
        let log = Arc::new(InMemoryEventLog::default());
        let strategy = Arc::new(EchoStrategy { initialized_with: SyncMutex::new(Vec::new()) });
        let runner = Arc::new(StrategyRunner::new(run_id, strategy, log.clone()));
        runner.initialize(&["AAPL".to_string()]).await;

        let foreign = Envelope::new(EnvelopeKind::Event, "data.WindowReady", "test", serde_json::json!({}))
            .with_run_id(other_run);
        log.append(foreign).await.unwrap();
        let ours = Envelope::new(EnvelopeKind::Event, "data.WindowReady", "test", serde_json::json!({}))
            .with_run_id(run_id);
        log.append(ours).await.unwrap();

        let page = log.read_from(-1, 10);
        let placed = page.iter().filter(|(_, e)| e.event_type == "strategy.PlaceRequest").count();
        assert_eq!(placed, 1);

        runner.cleanup();
    }
}
