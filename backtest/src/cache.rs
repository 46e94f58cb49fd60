use std::collections::HashMap;

use chrono::{DateTime, Utc};
use engine_execution::Bar;

/// Read-only, preloaded bar history for one run's `symbols × [start, end]`.
/// Immutable after construction so it can be shared freely across per-run
/// services without synchronization.
#[derive(Debug, Clone, Default)]
pub struct BarCache {
    bars: HashMap<String, Vec<Bar>>,
}

impl BarCache {
    pub fn new(bars: HashMap<String, Vec<Bar>>) -> Self {
        let mut sorted = bars;
        for series in sorted.values_mut() {
            series.sort_by_key(|bar| bar.timestamp);
        }
        Self { bars: sorted }
    }

    /// The bar for `symbol` whose timestamp exactly matches `ts`, if any.
    pub fn bar_at(&self, symbol: &str, ts: DateTime<Utc>) -> Option<&Bar> {
        self.bars
            .get(symbol)
            .and_then(|series| series.iter().find(|bar| bar.timestamp == ts))
    }

    /// Up to `lookback` bars for `symbol` at or before `as_of`, oldest
    /// first. Falls back to the most recent `lookback` bars when `as_of`
    /// is `None`.
    pub fn window(&self, symbol: &str, lookback: usize, as_of: Option<DateTime<Utc>>) -> Vec<Bar> {
        let Some(series) = self.bars.get(symbol) else {
            return Vec::new();
        };
        let eligible: Vec<&Bar> = match as_of {
            Some(cutoff) => series.iter().filter(|bar| bar.timestamp <= cutoff).collect(),
            None => series.iter().collect(),
        };
        eligible
            .into_iter()
            .rev()
            .take(lookback)
            .rev()
            .cloned()
            .collect()
    }
}
