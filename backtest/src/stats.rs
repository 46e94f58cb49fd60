use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use engine_analytics::metric::drawdown::MaxDrawdown;
use engine_analytics::metric::profit_factor::ProfitFactor;
use engine_analytics::metric::rate_of_return::RateOfReturn;
use engine_analytics::metric::sharpe::SharpeRatio;
use engine_analytics::metric::sortino::{downside_std_dev, SortinoRatio};
use engine_analytics::metric::win_rate::WinRate;
use engine_analytics::time::Daily;
use engine_execution::{Fill, Side};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestStats {
    pub total_return: Decimal,
    pub annualized_return: Option<Decimal>,
    pub sharpe: Option<Decimal>,
    pub sortino: Option<Decimal>,
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: Option<Decimal>,
    pub win_rate: Option<Decimal>,
    pub avg_win: Option<Decimal>,
    pub avg_loss: Option<Decimal>,
    pub profit_factor: Option<Decimal>,
    pub total_commission: Decimal,
    pub total_slippage: Decimal,
}

struct OpenLeg {
    side: Side,
    qty: Decimal,
    price: Decimal,
    commission: Decimal,
}

/// Pairs fills per symbol chronologically (entry-then-exit, FIFO) into
/// round-trip P&Ls. A fill opposite in direction to the open queue closes
/// against it; same-direction fills extend the queue instead.
pub fn round_trip_pnls(fills_by_symbol: &HashMap<String, Vec<(Side, Fill)>>) -> Vec<Decimal> {
    let mut pnls = Vec::new();

    for fills in fills_by_symbol.values() {
        let mut open: VecDeque<OpenLeg> = VecDeque::new();
        let mut ordered = fills.clone();
        ordered.sort_by_key(|(_, fill)| fill.timestamp);

        for (side, fill) in ordered {
            let mut remaining = fill.qty;
            while remaining > Decimal::ZERO {
                match open.front_mut() {
                    Some(leg) if leg.side != side => {
                        let matched = remaining.min(leg.qty);
                        let entry_commission = leg.commission * matched / leg.qty;
                        let exit_commission = fill.commission * matched / fill.qty;
                        let direction = if leg.side == Side::Buy { Decimal::ONE } else { -Decimal::ONE };
                        let pnl = direction * (fill.price - leg.price) * matched - entry_commission - exit_commission;
                        pnls.push(pnl);

                        leg.qty -= matched;
                        leg.commission -= entry_commission;
                        remaining -= matched;
                        if leg.qty.is_zero() {
                            open.pop_front();
                        }
                    }
                    _ => {
                        open.push_back(OpenLeg {
                            side,
                            qty: remaining,
                            price: fill.price,
                            commission: fill.commission * remaining / fill.qty,
                        });
                        remaining = Decimal::ZERO;
                    }
                }
            }
        }
    }

    pnls
}

fn equity_returns(curve: &[(DateTime<Utc>, Decimal)]) -> Vec<Decimal> {
    curve
        .windows(2)
        .filter_map(|pair| {
            let (_, prev) = pair[0];
            let (_, next) = pair[1];
            if prev.is_zero() {
                None
            } else {
                Some((next - prev) / prev)
            }
        })
        .collect()
}

fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<Decimal>() / Decimal::from(values.len()))
    }
}

fn std_dev(values: &[Decimal]) -> Option<Decimal> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance = values.iter().map(|v| (*v - m) * (*v - m)).sum::<Decimal>() / Decimal::from(values.len());
    variance.sqrt()
}

#[derive(Debug)]
pub struct StatsInput<'a> {
    pub equity_curve: &'a [(DateTime<Utc>, Decimal)],
    pub fills_by_symbol: &'a HashMap<String, Vec<(Side, Fill)>>,
    pub period_days: Decimal,
    /// Total dollar impact of slippage across the run's fills, summed by
    /// the caller since the simulator's per-fill slippage isn't carried on
    /// [`Fill`] itself.
    pub total_slippage: Decimal,
}

/// Computes the full [`BacktestStats`] shape from a completed run's equity
/// curve and fills log.
pub fn compute(input: StatsInput<'_>) -> BacktestStats {
    let start_equity = input.equity_curve.first().map(|(_, v)| *v).unwrap_or(Decimal::ZERO);
    let end_equity = input.equity_curve.last().map(|(_, v)| *v).unwrap_or(Decimal::ZERO);

    let total_return = RateOfReturn::calculate(start_equity, end_equity)
        .map(|r| r.value)
        .unwrap_or(Decimal::ZERO);
    let annualized_return = RateOfReturn::calculate(start_equity, end_equity)
        .and_then(|r| r.annualize(input.period_days))
        .map(|r| r.value);

    let returns = equity_returns(input.equity_curve);
    let sharpe = std_dev(&returns).and_then(|sd| {
        if sd.is_zero() {
            None
        } else {
            mean(&returns).map(|m| SharpeRatio::calculate(Decimal::ZERO, m, sd, Daily).value)
        }
    });
    let sortino = downside_std_dev(&returns)
        .filter(|sd| !sd.is_zero())
        .and_then(|sd| mean(&returns).map(|m| SortinoRatio::calculate(Decimal::ZERO, m, sd, Daily).value));

    let drawdown = MaxDrawdown::calculate(input.equity_curve).unwrap_or(MaxDrawdown { value: Decimal::ZERO, percentage: None });

    let pnls = round_trip_pnls(input.fills_by_symbol);
    let wins: Vec<Decimal> = pnls.iter().copied().filter(|p| *p > Decimal::ZERO).collect();
    let losses: Vec<Decimal> = pnls.iter().copied().filter(|p| *p < Decimal::ZERO).collect();
    let win_rate = WinRate::calculate(Decimal::from(wins.len()), Decimal::from(pnls.len())).map(|w| w.value);
    let avg_win = mean(&wins);
    let avg_loss = mean(&losses);
    let profit_factor = ProfitFactor::calculate(
        wins.iter().sum::<Decimal>(),
        losses.iter().sum::<Decimal>().abs(),
    )
    .map(|p| p.value);

    let total_commission: Decimal = input
        .fills_by_symbol
        .values()
        .flat_map(|fills| fills.iter().map(|(_, f)| f.commission))
        .sum();

    BacktestStats {
        total_return,
        annualized_return,
        sharpe,
        sortino,
        max_drawdown: drawdown.value,
        max_drawdown_pct: drawdown.percentage,
        win_rate,
        avg_win,
        avg_loss,
        profit_factor,
        total_commission,
        total_slippage: input.total_slippage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn fill(ts_days: i64, qty: Decimal, price: Decimal) -> Fill {
        Fill {
            order_id: Uuid::new_v4(),
            qty,
            price,
            commission: Decimal::ZERO,
            timestamp: DateTime::<Utc>::MIN_UTC + chrono::TimeDelta::days(ts_days),
        }
    }

    #[test]
    fn round_trip_pairs_a_simple_long_entry_and_exit() {
        let mut fills = HashMap::new();
        fills.insert(
            "AAPL".to_string(),
            vec![(Side::Buy, fill(0, dec!(10), dec!(100))), (Side::Sell, fill(1, dec!(10), dec!(110)))],
        );
        let pnls = round_trip_pnls(&fills);
        assert_eq!(pnls, vec![dec!(100)]);
    }

    #[test]
    fn round_trip_pairs_a_short_entry_and_exit_with_inverted_sign() {
        let mut fills = HashMap::new();
        fills.insert(
            "AAPL".to_string(),
            vec![(Side::Sell, fill(0, dec!(10), dec!(100))), (Side::Buy, fill(1, dec!(10), dec!(90)))],
        );
        let pnls = round_trip_pnls(&fills);
        assert_eq!(pnls, vec![dec!(100)]);
    }

    #[test]
    fn round_trip_handles_partial_fills_fifo() {
        let mut fills = HashMap::new();
        fills.insert(
            "AAPL".to_string(),
            vec![
                (Side::Buy, fill(0, dec!(10), dec!(100))),
                (Side::Sell, fill(1, dec!(4), dec!(110))),
                (Side::Sell, fill(2, dec!(6), dec!(120))),
            ],
        );
        let pnls = round_trip_pnls(&fills);
        assert_eq!(pnls.len(), 2);
        assert_eq!(pnls[0], dec!(40));
        assert_eq!(pnls[1], dec!(120));
    }
}
