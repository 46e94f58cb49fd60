#![forbid(unsafe_code)]
#![warn(unused, clippy::cognitive_complexity, clippy::unused_self, missing_debug_implementations, rust_2018_idioms)]

//! # Analytics
//!
//! Financial performance metrics used to summarize a completed backtest or
//! a live run's trading history: Sharpe, Sortino, Calmar, drawdown, win
//! rate, profit factor, and rate-of-return helpers.

/// Financial metrics and the [`time::TimeInterval`] they're computed over.
pub mod metric;

/// Time interval definitions (`Daily`, `Annual252`, `Annual365`) used to
/// scale metrics computed on one basis to another.
pub mod time;

use chrono::{DateTime, Utc};

/// Types that carry a timestamp.
pub trait Timed {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Pairs a value with the timestamp it was observed at.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedValue<T> {
    pub value: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> TimedValue<T> {
    pub fn new(value: T, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }
}

impl<T> Timed for TimedValue<T> {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
