use async_trait::async_trait;

use crate::action::Action;

/// The contract a strategy implements. The runner owns one instance per
/// run and drives it exclusively through this trait; a strategy never
/// touches the Event Log, an adapter, or any other run's state directly.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Called once before the first tick, with the run's configured symbols.
    async fn initialize(&self, _symbols: &[String]) {}

    /// Called on each clock tick. Returned actions are translated into
    /// mode-neutral events and appended to the Event Log.
    async fn on_tick(&self, tick: &engine_events::Tick) -> Vec<Action>;

    /// Called when a `data.WindowReady` response for this run arrives.
    async fn on_data(&self, payload: &serde_json::Value) -> Vec<Action>;
}
