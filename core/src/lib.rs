#![forbid(unsafe_code)]
#![warn(unused, clippy::cognitive_complexity, clippy::unused_self, missing_debug_implementations, rust_2018_idioms)]

//! Run orchestration, the run registry, configuration, and logging
//! wire-up. [`orchestrator::RunOrchestrator`] is the only thing here that
//! knows about every other crate in the workspace; everything else wires
//! together behind it.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod run;

pub use collaborators::{BarDataSource, StrategyFactory};
pub use config::EngineConfig;
pub use error::OrchestratorError;
pub use logging::{init_json_logging, init_logging};
pub use orchestrator::RunOrchestrator;
pub use run::{CreateRunRequest, InMemoryRunRepository, Run, RunMode, RunRepository, RunStatus};
