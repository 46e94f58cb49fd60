//! Contracts the Orchestrator consumes but never implements itself.
//! Strategy and adapter/bar discovery both live in the collaborator layer —
//! the core only needs to ask for them by id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_events::Timeframe;
use engine_execution::Bar;
use engine_strategy::Strategy;

use crate::error::OrchestratorError;

/// Resolves a `strategy_id` to a runnable [`Strategy`] instance.
#[async_trait]
pub trait StrategyFactory: Send + Sync {
    async fn create(&self, strategy_id: &str) -> Result<Arc<dyn Strategy>, OrchestratorError>;
}

/// Preloads historical bars for a backtest run. Implementations may read
/// from a database, a file cache, or a vendor API; the Orchestrator only
/// needs the window filled in before the Backtest Service starts ticking.
#[async_trait]
pub trait BarDataSource: Send + Sync {
    async fn load(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<Bar>>, OrchestratorError>;
}
