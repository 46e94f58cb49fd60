//! Logging initialization for the engine process.
//!
//! Human-readable output by default; [`init_json_logging`] switches to
//! structured JSON for log aggregators. Level is controlled by `RUST_LOG`
//! (e.g. `RUST_LOG=core=debug,execution=info`), defaulting to `info`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn env_filter() -> tracing_subscriber::filter::EnvFilter {
    tracing_subscriber::filter::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .from_env_lossy()
}

pub fn init_logging() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub fn init_json_logging() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init();
}
