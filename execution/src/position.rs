use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;

use crate::adapter::ExchangeAdapter;
use crate::error::ExecutionError;
use crate::types::{Fill, Position, PositionSide, Side};

#[derive(Debug, Clone, Copy)]
struct TrackedPosition {
    qty: Decimal,
    cost_basis: Decimal,
}

/// Derives `(symbol -> position)` from applied fills using weighted-average
/// cost basis. `qty` is stored signed internally (positive = long) and
/// surfaced to callers as non-negative magnitude plus a [`PositionSide`].
#[derive(Debug, Default)]
pub struct PositionTracker {
    positions: Mutex<HashMap<String, TrackedPosition>>,
}

fn side_sign(side: Side) -> Decimal {
    match side {
        Side::Buy => Decimal::ONE,
        Side::Sell => -Decimal::ONE,
    }
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_fill(&self, symbol: &str, side: Side, fill: &Fill) {
        let delta = side_sign(side) * fill.qty;
        let mut positions = self.positions.lock();

        let existing = positions.get(symbol).copied();
        match existing {
            None => {
                positions.insert(
                    symbol.to_string(),
                    TrackedPosition {
                        qty: delta,
                        cost_basis: fill.price,
                    },
                );
            }
            Some(pos) => {
                let new_qty = pos.qty + delta;
                let same_sign = pos.qty.signum() == delta.signum() || pos.qty.is_zero();

                let new_cost_basis = if new_qty.is_zero() {
                    Decimal::ZERO
                } else if same_sign {
                    let old_abs = pos.qty.abs();
                    let fill_abs = delta.abs();
                    (pos.cost_basis * old_abs + fill.price * fill_abs) / (old_abs + fill_abs)
                } else if new_qty.signum() == pos.qty.signum() {
                    // reducing without crossing zero
                    pos.cost_basis
                } else {
                    // sign flipped across zero
                    fill.price
                };

                if new_qty.is_zero() {
                    positions.remove(symbol);
                } else {
                    positions.insert(
                        symbol.to_string(),
                        TrackedPosition {
                            qty: new_qty,
                            cost_basis: new_cost_basis,
                        },
                    );
                }
            }
        }
    }

    pub fn get_position(&self, symbol: &str) -> Option<Position> {
        self.positions
            .lock()
            .get(symbol)
            .map(|pos| to_position(symbol, pos))
    }

    pub fn get_all_positions(&self) -> Vec<Position> {
        self.positions
            .lock()
            .iter()
            .map(|(symbol, pos)| to_position(symbol, pos))
            .collect()
    }

    /// Replaces local state with the exchange's authoritative view. Used at
    /// startup and after reconnecting following a disconnected period.
    pub async fn sync_from_exchange(
        &self,
        adapter: &dyn ExchangeAdapter,
    ) -> Result<(), ExecutionError> {
        let authoritative = adapter.get_positions().await?;
        let mut positions = self.positions.lock();
        positions.clear();
        for position in authoritative {
            let signed_qty = match position.side {
                PositionSide::Long => position.qty,
                PositionSide::Short => -position.qty,
            };
            positions.insert(
                position.symbol,
                TrackedPosition {
                    qty: signed_qty,
                    cost_basis: position.avg_entry_price,
                },
            );
        }
        Ok(())
    }
}

fn to_position(symbol: &str, pos: &TrackedPosition) -> Position {
    let side = if pos.qty.is_sign_negative() {
        PositionSide::Short
    } else {
        PositionSide::Long
    };
    Position {
        symbol: symbol.to_string(),
        qty: pos.qty.abs(),
        side,
        avg_entry_price: pos.cost_basis,
        market_value: Decimal::ZERO,
        unrealized_pnl: Decimal::ZERO,
        realized_pnl: Decimal::ZERO,
    }
}
