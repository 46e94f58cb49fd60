use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_events::{EventHandler, EventLog, Envelope, EnvelopeKind, Timeframe};
use engine_execution::{
    Bar, Fill, OrderIntent, OrderState, OrderStatus, OrderType, Position, PositionTracker, Side, TimeInForce,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::BarCache;
use crate::error::BacktestError;
use crate::simulator::{self, FillConfig};
use crate::stats::{self, BacktestStats, StatsInput};

const PRODUCER: &str = "veda";

#[derive(Debug, Serialize, Deserialize)]
struct FetchWindowPayload {
    symbol: String,
    lookback: usize,
    as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WindowReadyPayload {
    symbol: String,
    bars: Vec<Bar>,
}

/// The runner's mode-neutral `PlaceOrder` action, as routed onto
/// `backtest.*`. Carries none of `OrderIntent`'s run/idempotency/
/// time-in-force fields; those are filled in from the run and a freshly
/// generated id.
#[derive(Debug, Serialize, Deserialize)]
struct PlaceOrderPayload {
    symbol: String,
    side: Side,
    #[serde(with = "engine_integration::decimal")]
    qty: Decimal,
    order_type: OrderType,
    #[serde(with = "engine_integration::decimal::option", default)]
    limit_price: Option<Decimal>,
    #[serde(with = "engine_integration::decimal::option", default)]
    stop_price: Option<Decimal>,
}

struct PendingOrder {
    intent: OrderIntent,
    state: OrderState,
}

struct RunState {
    cash: Decimal,
    pending: Vec<PendingOrder>,
    fills_by_symbol: HashMap<String, Vec<(engine_execution::Side, Fill)>>,
    equity_curve: Vec<(DateTime<Utc>, Decimal)>,
    current_bars: HashMap<String, Bar>,
    total_slippage: Decimal,
}

/// One per-run instance wiring together a fill simulator, a preloaded bar
/// cache, a cash balance, pending orders, a fills log, and an equity curve.
#[allow(missing_debug_implementations)]
pub struct BacktestExecutionService {
    run_id: Uuid,
    symbols: Vec<String>,
    #[allow(dead_code)]
    timeframe: Timeframe,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    cache: BarCache,
    fill_config: FillConfig,
    positions: PositionTracker,
    event_log: Arc<dyn EventLog>,
    state: Mutex<RunState>,
}

impl BacktestExecutionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: Uuid,
        symbols: Vec<String>,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        initial_cash: Decimal,
        cache: BarCache,
        fill_config: FillConfig,
        event_log: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            run_id,
            symbols,
            timeframe,
            start,
            end,
            cache,
            fill_config,
            positions: PositionTracker::new(),
            event_log,
            state: Mutex::new(RunState {
                cash: initial_cash,
                pending: Vec::new(),
                fills_by_symbol: HashMap::new(),
                equity_curve: Vec::new(),
                current_bars: HashMap::new(),
                total_slippage: Decimal::ZERO,
            }),
        }
    }

    /// Subscribes to `backtest.FetchWindow` and `backtest.PlaceOrder`,
    /// filtered to this instance's `run_id`.
    pub fn subscribe(self: &Arc<Self>) {
        let handler: Arc<dyn EventHandler> = self.clone();
        let run_id = self.run_id;
        self.event_log.subscribe_filtered(
            vec!["backtest.FetchWindow".to_string(), "backtest.PlaceOrder".to_string()],
            handler,
            Some(Arc::new(move |envelope: &Envelope| envelope.run_id == Some(run_id))),
        );
    }

    async fn handle_fetch_window(&self, source: &Envelope) -> Result<(), BacktestError> {
        let payload: FetchWindowPayload = serde_json::from_value(source.payload.clone())
            .map_err(|e| BacktestError::ValidationError(e.to_string()))?;
        let bars = self.cache.window(&payload.symbol, payload.lookback, payload.as_of);

        let envelope = source
            .derive(
                EnvelopeKind::Event,
                "data.WindowReady",
                PRODUCER,
                serde_json::to_value(WindowReadyPayload { symbol: payload.symbol, bars })
                    .map_err(|e| BacktestError::StorageFailure(e.to_string()))?,
            )
            .with_run_id(self.run_id);
        self.event_log
            .append(envelope)
            .await
            .map_err(|e| BacktestError::StorageFailure(e.to_string()))?;
        Ok(())
    }

    async fn handle_place_order(&self, source: &Envelope) -> Result<(), BacktestError> {
        let payload: PlaceOrderPayload = serde_json::from_value(source.payload.clone())
            .map_err(|e| BacktestError::ValidationError(e.to_string()))?;
        let intent = OrderIntent {
            run_id: self.run_id,
            client_order_id: format!("backtest-{}", Uuid::new_v4()),
            symbol: payload.symbol,
            side: payload.side,
            order_type: payload.order_type,
            qty: payload.qty,
            limit_price: payload.limit_price,
            stop_price: payload.stop_price,
            time_in_force: TimeInForce::Day,
        };

        let now = Utc::now();
        let state = OrderState::from_intent(&intent, now);
        {
            let mut guard = self.state.lock();
            guard.pending.push(PendingOrder { intent, state: state.clone() });
        }

        let envelope = source
            .derive(
                EnvelopeKind::Event,
                "orders.Created",
                PRODUCER,
                serde_json::to_value(&state).map_err(|e| BacktestError::StorageFailure(e.to_string()))?,
            )
            .with_run_id(self.run_id);
        self.event_log
            .append(envelope)
            .await
            .map_err(|e| BacktestError::StorageFailure(e.to_string()))?;
        Ok(())
    }

    /// Advances simulated time to `ts`: refreshes each symbol's current
    /// bar, attempts to fill pending orders against it, marks positions to
    /// the close, and appends to the equity curve.
    pub async fn advance_to(&self, ts: DateTime<Utc>) -> Result<(), BacktestError> {
        let mut filled_orders = Vec::new();

        {
            let mut guard = self.state.lock();
            for symbol in &self.symbols {
                if let Some(bar) = self.cache.bar_at(symbol, ts) {
                    guard.current_bars.insert(symbol.clone(), *bar);
                }
            }

            let current_bars = guard.current_bars.clone();
            let drained: Vec<PendingOrder> = guard.pending.drain(..).collect();
            let mut still_pending = Vec::with_capacity(drained.len());
            for pending in drained {
                let bar = current_bars.get(&pending.intent.symbol).copied();
                let simulated = bar.and_then(|bar| simulator::try_fill(&pending.intent, &bar, &self.fill_config));
                match simulated {
                    Some(simulated) => {
                        let fill = Fill {
                            order_id: pending.state.id,
                            qty: simulated.qty,
                            price: simulated.price,
                            commission: simulated.commission,
                            timestamp: simulated.timestamp,
                        };
                        let notional = simulated.price * simulated.qty;
                        match pending.intent.side {
                            engine_execution::Side::Buy => guard.cash -= notional + simulated.commission,
                            engine_execution::Side::Sell => guard.cash += notional - simulated.commission,
                        }
                        guard.total_slippage += simulated.slippage.abs();
                        guard
                            .fills_by_symbol
                            .entry(pending.intent.symbol.clone())
                            .or_default()
                            .push((pending.intent.side, fill.clone()));

                        let mut state = pending.state.clone();
                        state.status = OrderStatus::Filled;
                        state.filled_qty = fill.qty;
                        state.filled_avg_price = Some(fill.price);
                        state.filled_at = Some(fill.timestamp);
                        filled_orders.push((state, fill, pending.intent.side, pending.intent.symbol.clone()));
                    }
                    None => still_pending.push(pending),
                }
            }
            guard.pending = still_pending;
        }

        for (state, fill, side, symbol) in &filled_orders {
            self.positions.apply_fill(symbol, *side, fill);
            let envelope = Envelope::new(
                EnvelopeKind::Event,
                "orders.Filled",
                PRODUCER,
                serde_json::to_value(state).map_err(|e| BacktestError::StorageFailure(e.to_string()))?,
            )
            .with_run_id(self.run_id);
            self.event_log
                .append(envelope)
                .await
                .map_err(|e| BacktestError::StorageFailure(e.to_string()))?;
        }

        let mut guard = self.state.lock();
        let mut total_market_value = Decimal::ZERO;
        for symbol in &self.symbols {
            if let (Some(position), Some(bar)) = (self.positions.get_position(symbol), guard.current_bars.get(symbol)) {
                let signed_qty = match position.side {
                    engine_execution::PositionSide::Long => position.qty,
                    engine_execution::PositionSide::Short => -position.qty,
                };
                total_market_value += signed_qty * bar.close;
            }
        }
        let equity = guard.cash + total_market_value;
        guard.equity_curve.push((ts, equity));

        Ok(())
    }

    /// True once `ts` has passed the run's configured end.
    pub fn is_complete(&self, ts: DateTime<Utc>) -> bool {
        ts > self.end
    }

    pub fn positions(&self) -> Vec<Position> {
        self.positions.get_all_positions()
    }

    /// Assembles the final [`BacktestResult`] from the accumulated fills and
    /// equity curve.
    pub fn result(&self) -> BacktestResult {
        let guard = self.state.lock();
        let period_days = Decimal::from((self.end - self.start).num_days().max(1));
        let stats = stats::compute(StatsInput {
            equity_curve: &guard.equity_curve,
            fills_by_symbol: &guard.fills_by_symbol,
            period_days,
            total_slippage: guard.total_slippage,
        });
        let fills: Vec<Fill> = guard
            .fills_by_symbol
            .values()
            .flat_map(|fills| fills.iter().map(|(_, f)| f.clone()))
            .collect();

        BacktestResult {
            stats,
            final_equity: guard.equity_curve.last().map(|(_, v)| *v).unwrap_or(guard.cash),
            equity_curve: guard.equity_curve.clone(),
            fills,
        }
    }

    pub async fn cleanup(&self) {}
}

/// Output of a completed backtest run: statistics, final equity, the full
/// equity curve, and the fills log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub stats: BacktestStats,
    pub final_equity: Decimal,
    pub equity_curve: Vec<(DateTime<Utc>, Decimal)>,
    pub fills: Vec<Fill>,
}

#[async_trait]
impl EventHandler for BacktestExecutionService {
    async fn handle(&self, _offset: i64, envelope: &Envelope) {
        let result = match envelope.event_type.as_str() {
            "backtest.FetchWindow" => self.handle_fetch_window(envelope).await,
            "backtest.PlaceOrder" => self.handle_place_order(envelope).await,
            _ => return,
        };
        if let Err(err) = result {
            tracing::error!(run_id = %self.run_id, event_type = %envelope.event_type, error = %err, "backtest event handling failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_events::InMemoryEventLog;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn bar(ts: DateTime<Utc>, close: Decimal) -> Bar {
        Bar { timestamp: ts, open: close, high: close, low: close, close, volume: dec!(1000) }
    }

    fn make_service(run_id: Uuid, bars: Vec<Bar>) -> Arc<BacktestExecutionService> {
        let start = bars.first().unwrap().timestamp;
        let end = bars.last().unwrap().timestamp;
        let mut series = HashMap::new();
        series.insert("AAPL".to_string(), bars);
        let cache = BarCache::new(series);
        Arc::new(BacktestExecutionService::new(
            run_id,
            vec!["AAPL".to_string()],
            Timeframe::M1,
            start,
            end,
            dec!(10_000),
            cache,
            FillConfig::default(),
            Arc::new(InMemoryEventLog::default()),
        ))
    }

    #[tokio::test]
    async fn advance_to_fills_a_pending_market_order_and_updates_equity() {
        let run_id = Uuid::new_v4();
        let t0 = Utc::now();
        let t1 = t0 + chrono::TimeDelta::minutes(1);
        let bars = vec![bar(t0, dec!(100)), bar(t1, dec!(110))];
        let svc = make_service(run_id, bars);

        let payload = PlaceOrderPayload {
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            qty: dec!(10),
            limit_price: None,
            stop_price: None,
        };
        let envelope = Envelope::new(EnvelopeKind::Event, "backtest.PlaceOrder", "test", serde_json::to_value(&payload).unwrap())
            .with_run_id(run_id);
        svc.handle_place_order(&envelope).await.unwrap();

        svc.advance_to(t0).await.unwrap();
        let result = svc.result();
        assert_eq!(result.fills.len(), 1);
        assert_eq!(result.fills[0].price, dec!(100));

        svc.advance_to(t1).await.unwrap();
        let result = svc.result();
        assert_eq!(result.equity_curve.len(), 2);
        // cash down 1000 from the buy, position worth 1100 at t1's close.
        assert_eq!(result.equity_curve[1].1, dec!(10_000) - dec!(1000) + dec!(1100));
    }

    #[tokio::test]
    async fn fetch_window_emits_window_ready_preserving_the_correlation_chain() {
        let run_id = Uuid::new_v4();
        let t0 = Utc::now();
        let bars = vec![bar(t0, dec!(100))];
        let svc = make_service(run_id, bars);
        let log = svc.event_log.clone();

        let source = Envelope::new(
            EnvelopeKind::Event,
            "backtest.FetchWindow",
            "test",
            serde_json::to_value(FetchWindowPayload { symbol: "AAPL".to_string(), lookback: 1, as_of: Some(t0) }).unwrap(),
        )
        .with_run_id(run_id);
        svc.handle_fetch_window(&source).await.unwrap();

        let page = log.read_from(-1, 10);
        assert_eq!(page.len(), 1);
        let (_, emitted) = &page[0];
        assert_eq!(emitted.event_type, "data.WindowReady");
        assert_eq!(emitted.corr_id, source.corr_id);
        assert_eq!(emitted.causation_id, Some(source.id));
    }
}
