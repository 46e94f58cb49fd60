#![forbid(unsafe_code)]
#![warn(unused, clippy::cognitive_complexity, clippy::unused_self, missing_debug_implementations, rust_2018_idioms)]

//! Per-run historical fill simulation: a preloaded [`cache::BarCache`], a
//! market/limit/stop [`simulator`], and [`service::BacktestExecutionService`]
//! which wires them into `advance_to`/`FetchWindow` handling and assembles
//! the final [`service::BacktestResult`] with [`engine_analytics`]-derived
//! statistics.

pub mod cache;
pub mod error;
pub mod service;
pub mod simulator;
pub mod stats;

pub use cache::BarCache;
pub use error::BacktestError;
pub use service::{BacktestExecutionService, BacktestResult};
pub use simulator::{try_fill, FillConfig, PriceBasis, SimulatedFill};
pub use stats::{compute as compute_stats, round_trip_pnls, BacktestStats, StatsInput};
