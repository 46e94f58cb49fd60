#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! The append-only event log, consumer offsets, and clocks that every run
//! is built on top of. Nothing in this crate knows about orders, bars, or
//! strategies — it only moves [`Envelope`]s and [`clock::Tick`]s around in
//! order.

pub mod clock;
pub mod envelope;
pub mod error;
pub mod log;
pub mod offsets;

pub use clock::{BacktestClock, BacktestClockHandle, ClockHandle, RealtimeClock, Tick, TickCallback, Timeframe};
pub use envelope::{Envelope, EnvelopeKind, OutboxRecord};
pub use error::EventLogError;
pub use log::{EventHandler, EventLog, EventLogConfig, EnvelopeFilter, InMemoryEventLog, SubscriptionId};
pub use offsets::{InMemoryOffsetStore, OffsetStore};
