use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_events::Timeframe;
pub use engine_strategy::RunMode;
use engine_strategy::RunModeLookup;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Stopped,
    Completed,
    Failed,
}

/// A validated request to create a run. Construction happens in
/// [`crate::orchestrator::RunOrchestrator::create`]; this type only carries
/// already-checked data.
#[derive(Debug, Clone)]
pub struct CreateRunRequest {
    pub strategy_id: String,
    pub mode: RunMode,
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub strategy_id: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub config: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// Persists run state transitions so a restarting process can tell which
/// runs were last known `running` (spec §4.8 "Persistence").
#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn upsert(&self, run: Run);
    async fn get(&self, run_id: Uuid) -> Option<Run>;
    async fn list(&self) -> Vec<Run>;
    async fn list_active(&self) -> Vec<Run>;
}

#[derive(Debug, Default)]
pub struct InMemoryRunRepository {
    runs: Mutex<HashMap<Uuid, Run>>,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn upsert(&self, run: Run) {
        self.runs.lock().insert(run.id, run);
    }

    async fn get(&self, run_id: Uuid) -> Option<Run> {
        self.runs.lock().get(&run_id).cloned()
    }

    async fn list(&self) -> Vec<Run> {
        self.runs.lock().values().cloned().collect()
    }

    async fn list_active(&self) -> Vec<Run> {
        self.runs
            .lock()
            .values()
            .filter(|r| matches!(r.status, RunStatus::Pending | RunStatus::Running))
            .cloned()
            .collect()
    }
}

impl RunModeLookup for InMemoryRunRepository {
    fn mode_of(&self, run_id: Uuid) -> Option<RunMode> {
        self.runs.lock().get(&run_id).map(|r| r.mode)
    }
}
