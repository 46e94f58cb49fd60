//! Owns the lifecycle of every run: creation, starting the right clock for
//! the run's mode, driving ticks through the Strategy Runner, and tearing
//! everything down on stop, completion, or error.
//!
//! The clock's tick callback is synchronous (it may run on any thread the
//! clock task picks) but strategy/execution processing is async, so each
//! run bridges the two with an unbounded channel: the callback only pushes
//! a [`Tick`] onto it, and the processing loop (this module) drains it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use engine_backtest::{BacktestExecutionService, BacktestResult, BarCache, FillConfig};
use engine_events::{BacktestClock, BacktestClockHandle, ClockHandle, Envelope, EnvelopeKind, EventLog, RealtimeClock, Tick, TickCallback, Timeframe};
use engine_execution::LiveExecutionService;
use engine_strategy::StrategyRunner;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::collaborators::{BarDataSource, StrategyFactory};
use crate::error::OrchestratorError;
use crate::run::{CreateRunRequest, InMemoryRunRepository, Run, RunMode, RunRepository, RunStatus};

const PRODUCER: &str = "glados.run_manager";
const DEFAULT_INITIAL_CASH: u32 = 100_000;

fn initial_cash(config: &Option<serde_json::Value>) -> Decimal {
    config
        .as_ref()
        .and_then(|c| c.get("initial_cash"))
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| Decimal::from(DEFAULT_INITIAL_CASH))
}

enum ClockControl {
    Realtime(Arc<ClockHandle>),
    Backtest(Arc<BacktestClockHandle>),
}

impl ClockControl {
    fn stop(&self) {
        match self {
            ClockControl::Realtime(h) => h.stop(),
            ClockControl::Backtest(h) => h.stop(),
        }
    }
}

struct RunContext {
    runner: Arc<StrategyRunner>,
    backtest_service: Option<Arc<BacktestExecutionService>>,
    clock: ClockControl,
}

enum Outcome {
    Completed,
    Stopped,
    Failed(String),
}

/// Drives runs from `pending` through to a terminal status. One instance
/// per process; shared via `Arc` so `start`'s background live/paper loop
/// and a concurrent `stop` call can both reach it.
#[allow(missing_debug_implementations)]
pub struct RunOrchestrator {
    event_log: Arc<dyn EventLog>,
    runs: Arc<InMemoryRunRepository>,
    live_execution: Arc<LiveExecutionService>,
    strategy_factory: Arc<dyn StrategyFactory>,
    bar_source: Arc<dyn BarDataSource>,
    contexts: Mutex<HashMap<Uuid, RunContext>>,
    results: Mutex<HashMap<Uuid, BacktestResult>>,
}

impl RunOrchestrator {
    pub fn new(
        event_log: Arc<dyn EventLog>,
        runs: Arc<InMemoryRunRepository>,
        live_execution: Arc<LiveExecutionService>,
        strategy_factory: Arc<dyn StrategyFactory>,
        bar_source: Arc<dyn BarDataSource>,
    ) -> Arc<Self> {
        let router = Arc::new(engine_strategy::DomainRouter::new(runs.clone(), event_log.clone()));
        router.subscribe();
        live_execution.subscribe();
        Arc::new(Self {
            event_log,
            runs,
            live_execution,
            strategy_factory,
            bar_source,
            contexts: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
        })
    }

    async fn emit(&self, run_id: Uuid, event_type: &str, payload: serde_json::Value) {
        let envelope = Envelope::new(EnvelopeKind::Event, event_type, PRODUCER, payload).with_run_id(run_id);
        if let Err(err) = self.event_log.append(envelope).await {
            tracing::error!(run_id = %run_id, event_type, error = %err, "orchestrator failed to append lifecycle event");
        }
    }

    pub async fn create(&self, request: CreateRunRequest) -> Result<Run, OrchestratorError> {
        if request.symbols.is_empty() {
            return Err(OrchestratorError::ValidationError("symbols must not be empty".to_string()));
        }
        match request.mode {
            RunMode::Backtest => {
                let (Some(start), Some(end)) = (request.start, request.end) else {
                    return Err(OrchestratorError::ValidationError(
                        "backtest runs require both start and end".to_string(),
                    ));
                };
                if end < start {
                    return Err(OrchestratorError::ValidationError("end must be >= start".to_string()));
                }
            }
            RunMode::Paper | RunMode::Live => {
                if request.start.is_some() || request.end.is_some() {
                    return Err(OrchestratorError::ValidationError(
                        "live and paper runs do not accept start/end".to_string(),
                    ));
                }
            }
        }

        let run = Run {
            id: Uuid::new_v4(),
            strategy_id: request.strategy_id,
            mode: request.mode,
            status: RunStatus::Pending,
            symbols: request.symbols,
            timeframe: request.timeframe,
            start: request.start,
            end: request.end,
            config: request.config,
            created_at: Utc::now(),
            started_at: None,
            stopped_at: None,
        };
        self.runs.upsert(run.clone()).await;
        self.emit(
            run.id,
            "run.Created",
            serde_json::json!({ "strategy_id": run.strategy_id, "mode": run.mode }),
        )
        .await;
        Ok(run)
    }

    /// Requires `pending`. For backtests this drives the run to completion
    /// before returning; for live/paper it starts a background loop and
    /// returns immediately with status `running`.
    pub async fn start(self: &Arc<Self>, run_id: Uuid) -> Result<Run, OrchestratorError> {
        let mut run = self.runs.get(run_id).await.ok_or(OrchestratorError::NotFound(run_id))?;
        if run.status != RunStatus::Pending {
            return Err(OrchestratorError::IllegalTransition(run_id, run.status));
        }

        let strategy = self.strategy_factory.create(&run.strategy_id).await?;
        let runner = Arc::new(StrategyRunner::new(run_id, strategy, self.event_log.clone()));
        runner.initialize(&run.symbols).await;

        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        self.runs.upsert(run.clone()).await;
        self.emit(run_id, "run.Started", serde_json::json!({ "mode": run.mode })).await;

        match run.mode {
            RunMode::Backtest => self.run_backtest(run_id, &run, runner).await?,
            RunMode::Paper | RunMode::Live => self.run_live(run_id, run.timeframe, runner),
        }

        self.runs.get(run_id).await.ok_or(OrchestratorError::NotFound(run_id))
    }

    async fn run_backtest(&self, run_id: Uuid, run: &Run, runner: Arc<StrategyRunner>) -> Result<(), OrchestratorError> {
        let start = run.start.expect("validated at create");
        let end = run.end.expect("validated at create");
        let bars = self.bar_source.load(&run.symbols, run.timeframe, start, end).await?;
        let cache = BarCache::new(bars);
        let backtest_service = Arc::new(BacktestExecutionService::new(
            run_id,
            run.symbols.clone(),
            run.timeframe,
            start,
            end,
            initial_cash(&run.config),
            cache,
            FillConfig::default(),
            self.event_log.clone(),
        ));
        backtest_service.subscribe();

        let (tx, mut rx) = mpsc::unbounded_channel::<Tick>();
        let clock = BacktestClock::new(start, end, run.timeframe);
        let callback: TickCallback = Arc::new(move |tick| {
            let _ = tx.send(tick);
        });
        let handle = Arc::new(clock.start(run_id, vec![callback], true));

        self.contexts.lock().insert(
            run_id,
            RunContext {
                runner: runner.clone(),
                backtest_service: Some(backtest_service.clone()),
                clock: ClockControl::Backtest(handle.clone()),
            },
        );

        let mut failure = None;
        while let Some(tick) = rx.recv().await {
            if let Err(err) = runner.on_tick(&tick).await {
                failure = Some(err.to_string());
                break;
            }
            if let Err(err) = backtest_service.advance_to(tick.ts).await {
                failure = Some(err.to_string());
                break;
            }
            let done = backtest_service.is_complete(tick.ts);
            handle.acknowledge();
            if done {
                break;
            }
        }

        match failure {
            Some(reason) => self.finalize(run_id, Outcome::Failed(reason)).await,
            None => self.finalize(run_id, Outcome::Completed).await,
        }
        Ok(())
    }

    fn run_live(self: &Arc<Self>, run_id: Uuid, timeframe: Timeframe, runner: Arc<StrategyRunner>) {
        self.live_execution.register_run(run_id);

        let (tx, mut rx) = mpsc::unbounded_channel::<Tick>();
        let clock = RealtimeClock::new(timeframe);
        let callback: TickCallback = Arc::new(move |tick| {
            let _ = tx.send(tick);
        });
        let handle = Arc::new(clock.start(run_id, vec![callback]));

        self.contexts.lock().insert(
            run_id,
            RunContext {
                runner: runner.clone(),
                backtest_service: None,
                clock: ClockControl::Realtime(handle),
            },
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(tick) = rx.recv().await {
                if let Err(err) = runner.on_tick(&tick).await {
                    this.finalize(run_id, Outcome::Failed(err.to_string())).await;
                    return;
                }
            }
        });
    }

    /// Idempotent. Returns the current run unchanged if it is already
    /// terminal; otherwise cancels the clock and cleans up.
    pub async fn stop(&self, run_id: Uuid) -> Result<Run, OrchestratorError> {
        let run = self.runs.get(run_id).await.ok_or(OrchestratorError::NotFound(run_id))?;
        match run.status {
            RunStatus::Stopped | RunStatus::Completed | RunStatus::Failed => return Ok(run),
            RunStatus::Pending => {
                let mut run = run;
                run.status = RunStatus::Stopped;
                run.stopped_at = Some(Utc::now());
                self.runs.upsert(run.clone()).await;
                self.emit(run_id, "run.Stopped", serde_json::json!({})).await;
                return Ok(run);
            }
            RunStatus::Running => {}
        }
        self.finalize(run_id, Outcome::Stopped).await;
        self.runs.get(run_id).await.ok_or(OrchestratorError::NotFound(run_id))
    }

    /// Whichever caller (a run's own completion path, or a concurrent
    /// `stop`) wins the `remove` performs cleanup and the state
    /// transition exactly once; the other sees `None` and no-ops.
    async fn finalize(&self, run_id: Uuid, outcome: Outcome) {
        let Some(context) = self.contexts.lock().remove(&run_id) else {
            return;
        };
        context.clock.stop();
        context.runner.cleanup();
        if let Some(svc) = context.backtest_service {
            svc.cleanup().await;
            if matches!(outcome, Outcome::Completed) {
                self.results.lock().insert(run_id, svc.result());
            }
        }

        let Some(mut run) = self.runs.get(run_id).await else {
            return;
        };
        run.stopped_at = Some(Utc::now());
        let (status, event_type, payload) = match &outcome {
            Outcome::Completed => (RunStatus::Completed, "run.Completed", serde_json::json!({})),
            Outcome::Stopped => (RunStatus::Stopped, "run.Stopped", serde_json::json!({})),
            Outcome::Failed(reason) => (RunStatus::Failed, "run.Failed", serde_json::json!({ "error": reason })),
        };
        run.status = status;
        self.runs.upsert(run).await;
        self.emit(run_id, event_type, payload).await;
    }

    pub async fn get_run(&self, run_id: Uuid) -> Option<Run> {
        self.runs.get(run_id).await
    }

    pub async fn list_runs(&self) -> Vec<Run> {
        self.runs.list().await
    }

    pub async fn list_active_runs(&self) -> Vec<Run> {
        self.runs.list_active().await
    }

    pub fn get_backtest_result(&self, run_id: Uuid) -> Option<BacktestResult> {
        self.results.lock().get(&run_id).cloned()
    }
}
