use chrono::{DateTime, Utc};
use engine_execution::{Bar, OrderIntent, OrderType, Side};
use rust_decimal::Decimal;

/// Which point on the bar a `market` order fills at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceBasis {
    #[default]
    Open,
    Close,
    /// `(high + low + close) / 3`.
    Vwap,
}

#[derive(Debug, Clone, Copy)]
pub struct FillConfig {
    pub price_basis: PriceBasis,
    pub slippage_bps: Decimal,
    pub commission_bps: Decimal,
    pub min_commission: Decimal,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            price_basis: PriceBasis::default(),
            slippage_bps: Decimal::ZERO,
            commission_bps: Decimal::ZERO,
            min_commission: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedFill {
    pub price: Decimal,
    pub qty: Decimal,
    pub commission: Decimal,
    /// Absolute dollar impact of slippage, `Δprice · qty`.
    pub slippage: Decimal,
    pub timestamp: DateTime<Utc>,
}

fn basis_price(basis: PriceBasis, bar: &Bar) -> Decimal {
    match basis {
        PriceBasis::Open => bar.open,
        PriceBasis::Close => bar.close,
        PriceBasis::Vwap => (bar.high + bar.low + bar.close) / Decimal::from(3),
    }
}

fn commission_for(notional: Decimal, config: &FillConfig) -> Decimal {
    let pct = notional.abs() * config.commission_bps / Decimal::from(10_000);
    pct.max(config.min_commission)
}

/// Attempts to fill `intent` against `bar`. Returns `None` if the order's
/// trigger condition isn't met and it should remain pending.
pub fn try_fill(intent: &OrderIntent, bar: &Bar, config: &FillConfig) -> Option<SimulatedFill> {
    match intent.order_type {
        OrderType::Market => {
            let raw_price = basis_price(config.price_basis, bar);
            let slip_factor = config.slippage_bps / Decimal::from(10_000);
            let price = match intent.side {
                Side::Buy => raw_price * (Decimal::ONE + slip_factor),
                Side::Sell => raw_price * (Decimal::ONE - slip_factor),
            };
            let slippage = (price - raw_price) * intent.qty;
            let commission = commission_for(price * intent.qty, config);
            Some(SimulatedFill {
                price,
                qty: intent.qty,
                commission,
                slippage,
                timestamp: bar.timestamp,
            })
        }
        OrderType::Limit => {
            let limit_price = intent.limit_price?;
            let triggers = match intent.side {
                Side::Buy => bar.low <= limit_price,
                Side::Sell => bar.high >= limit_price,
            };
            if !triggers {
                return None;
            }
            let commission = commission_for(limit_price * intent.qty, config);
            Some(SimulatedFill {
                price: limit_price,
                qty: intent.qty,
                commission,
                slippage: Decimal::ZERO,
                timestamp: bar.timestamp,
            })
        }
        OrderType::Stop => {
            let stop_price = intent.stop_price?;
            let triggers = match intent.side {
                Side::Buy => bar.high >= stop_price,
                Side::Sell => bar.low <= stop_price,
            };
            if !triggers {
                return None;
            }
            let commission = commission_for(stop_price * intent.qty, config);
            Some(SimulatedFill {
                price: stop_price,
                qty: intent.qty,
                commission,
                slippage: Decimal::ZERO,
                timestamp: bar.timestamp,
            })
        }
        // Stop-limit is out of scope; such orders never fill in the simulator.
        OrderType::StopLimit => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_execution::TimeInForce;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn bar() -> Bar {
        Bar {
            timestamp: Utc::now(),
            open: dec!(100),
            high: dec!(105),
            low: dec!(95),
            close: dec!(102),
            volume: dec!(1000),
        }
    }

    fn intent(order_type: OrderType, side: Side, limit_price: Option<Decimal>, stop_price: Option<Decimal>) -> OrderIntent {
        OrderIntent {
            run_id: Uuid::new_v4(),
            client_order_id: "c-1".to_string(),
            symbol: "AAPL".to_string(),
            side,
            order_type,
            qty: dec!(10),
            limit_price,
            stop_price,
            time_in_force: TimeInForce::Day,
        }
    }

    #[test]
    fn market_buy_fills_at_open_with_unfavorable_slippage() {
        let config = FillConfig {
            price_basis: PriceBasis::Open,
            slippage_bps: dec!(10),
            commission_bps: dec!(0),
            min_commission: dec!(0),
        };
        let fill = try_fill(&intent(OrderType::Market, Side::Buy, None, None), &bar(), &config).unwrap();
        assert_eq!(fill.price, dec!(100) * (dec!(1) + dec!(10) / dec!(10000)));
        assert!(fill.slippage > Decimal::ZERO);
    }

    #[test]
    fn market_sell_fills_at_close_with_unfavorable_slippage() {
        let config = FillConfig {
            price_basis: PriceBasis::Close,
            slippage_bps: dec!(10),
            commission_bps: dec!(0),
            min_commission: dec!(0),
        };
        let fill = try_fill(&intent(OrderType::Market, Side::Sell, None, None), &bar(), &config).unwrap();
        assert_eq!(fill.price, dec!(102) * (dec!(1) - dec!(10) / dec!(10000)));
        assert!(fill.slippage < Decimal::ZERO);
    }

    #[test]
    fn limit_buy_fills_only_when_bar_low_reaches_the_limit() {
        let config = FillConfig::default();
        assert!(try_fill(&intent(OrderType::Limit, Side::Buy, Some(dec!(94)), None), &bar(), &config).is_none());
        let fill = try_fill(&intent(OrderType::Limit, Side::Buy, Some(dec!(96)), None), &bar(), &config).unwrap();
        assert_eq!(fill.price, dec!(96));
    }

    #[test]
    fn stop_sell_triggers_when_bar_low_breaches_the_stop() {
        let config = FillConfig::default();
        let fill = try_fill(&intent(OrderType::Stop, Side::Sell, None, Some(dec!(96))), &bar(), &config).unwrap();
        assert_eq!(fill.price, dec!(96));
        assert!(try_fill(&intent(OrderType::Stop, Side::Sell, None, Some(dec!(90))), &bar(), &config).is_none());
    }

    #[test]
    fn commission_respects_the_configured_minimum() {
        let config = FillConfig {
            price_basis: PriceBasis::Open,
            slippage_bps: dec!(0),
            commission_bps: dec!(1),
            min_commission: dec!(5),
        };
        let fill = try_fill(&intent(OrderType::Market, Side::Buy, None, None), &bar(), &config).unwrap();
        assert_eq!(fill.commission, dec!(5));
    }

    #[test]
    fn limit_order_fills_when_the_bar_low_touches_the_limit_price() {
        let bar = Bar {
            timestamp: Utc::now(),
            open: dec!(42000),
            high: dec!(42100),
            low: dec!(41850),
            close: dec!(42050),
            volume: dec!(1000),
        };
        let config = FillConfig {
            price_basis: PriceBasis::Open,
            slippage_bps: dec!(0),
            commission_bps: dec!(10),
            min_commission: dec!(0),
        };
        let mut order = intent(OrderType::Limit, Side::Buy, Some(dec!(41900)), None);
        order.qty = dec!(1);

        let fill = try_fill(&order, &bar, &config).unwrap();
        assert_eq!(fill.price, dec!(41900));
        assert_eq!(fill.slippage, Decimal::ZERO);
        assert_eq!(fill.commission, dec!(41900) * dec!(10) / dec!(10000));

        let tracker = engine_execution::PositionTracker::new();
        tracker.apply_fill(
            "BTCUSD",
            Side::Buy,
            &engine_execution::Fill {
                order_id: Uuid::new_v4(),
                price: fill.price,
                qty: fill.qty,
                commission: fill.commission,
                timestamp: fill.timestamp,
            },
        );
        let position = tracker.get_position("BTCUSD").unwrap();
        assert_eq!(position.qty, dec!(1));
        assert_eq!(position.side, engine_execution::PositionSide::Long);
    }
}
