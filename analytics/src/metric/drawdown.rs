use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Um drawdown completo: do pico até o vale, confirmado pela recuperação
/// acima do pico anterior.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Drawdown {
    pub peak: Decimal,
    pub peak_time: DateTime<Utc>,
    pub trough: Decimal,
    pub trough_time: DateTime<Utc>,
}

impl Drawdown {
    /// Magnitude absoluta da queda (negativa quando houve perda).
    pub fn value(&self) -> Decimal {
        self.trough - self.peak
    }

    /// Queda percentual em relação ao pico.
    pub fn percentage(&self) -> Option<Decimal> {
        if self.peak.is_zero() {
            None
        } else {
            self.value().checked_div(self.peak.abs())
        }
    }
}

/// Acompanha um valor em série temporal (tipicamente equity) e emite um
/// [`Drawdown`] completo assim que o valor se recupera acima do pico que o
/// precedeu. Enquanto o vale ainda não foi recuperado, `update` retorna
/// `None`.
#[derive(Debug, Clone)]
pub struct DrawdownGenerator {
    peak: Decimal,
    peak_time: DateTime<Utc>,
    trough: Decimal,
    trough_time: DateTime<Utc>,
    in_drawdown: bool,
}

impl DrawdownGenerator {
    pub fn init(value: Decimal, time: DateTime<Utc>) -> Self {
        Self {
            peak: value,
            peak_time: time,
            trough: value,
            trough_time: time,
            in_drawdown: false,
        }
    }

    pub fn update(&mut self, value: Decimal, time: DateTime<Utc>) -> Option<Drawdown> {
        if value >= self.peak {
            let completed = if self.in_drawdown {
                Some(Drawdown {
                    peak: self.peak,
                    peak_time: self.peak_time,
                    trough: self.trough,
                    trough_time: self.trough_time,
                })
            } else {
                None
            };
            self.peak = value;
            self.peak_time = time;
            self.trough = value;
            self.trough_time = time;
            self.in_drawdown = false;
            completed
        } else {
            if value < self.trough {
                self.trough = value;
                self.trough_time = time;
            }
            self.in_drawdown = true;
            None
        }
    }
}

/// Maior queda observada em uma curva de equity: `min(equity - running_peak)`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MaxDrawdown {
    pub value: Decimal,
    pub percentage: Option<Decimal>,
}

impl MaxDrawdown {
    pub fn calculate(curve: &[(DateTime<Utc>, Decimal)]) -> Option<Self> {
        let mut iter = curve.iter();
        let (_, first) = iter.next()?;
        let mut peak = *first;
        let mut worst = Decimal::ZERO;
        let mut worst_peak = peak;

        for &(_, value) in iter {
            if value > peak {
                peak = value;
            }
            let drawdown = value - peak;
            if drawdown < worst {
                worst = drawdown;
                worst_peak = peak;
            }
        }

        let percentage = if worst_peak.is_zero() {
            None
        } else {
            worst.checked_div(worst_peak.abs())
        };

        Some(Self { value: worst, percentage })
    }
}
