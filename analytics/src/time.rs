use chrono::TimeDelta;

/// The time base a statistic such as [`crate::metric::sharpe::SharpeRatio`]
/// was computed over, so it can later be rescaled to a different base.
pub trait TimeInterval: Clone + PartialEq + std::fmt::Debug {
    fn interval(&self) -> TimeDelta;
}

impl TimeInterval for TimeDelta {
    fn interval(&self) -> TimeDelta {
        *self
    }
}

/// One trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Daily;

impl TimeInterval for Daily {
    fn interval(&self) -> TimeDelta {
        TimeDelta::days(1)
    }
}

/// A calendar year of 365 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Annual365;

impl TimeInterval for Annual365 {
    fn interval(&self) -> TimeDelta {
        TimeDelta::days(365)
    }
}

/// A trading year of 252 business days, the convention used when scaling
/// daily Sharpe/Sortino ratios to an annualized figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Annual252;

impl TimeInterval for Annual252 {
    fn interval(&self) -> TimeDelta {
        TimeDelta::days(252)
    }
}
