use chrono::{DateTime, Utc};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[display("buy")]
    Buy,
    #[display("sell")]
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    #[display("market")]
    Market,
    #[display("limit")]
    Limit,
    #[display("stop")]
    Stop,
    #[display("stop_limit")]
    StopLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    #[display("day")]
    Day,
    #[display("gtc")]
    Gtc,
    #[display("ioc")]
    Ioc,
    #[display("fok")]
    Fok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[display("pending")]
    Pending,
    #[display("submitting")]
    Submitting,
    #[display("submitted")]
    Submitted,
    #[display("accepted")]
    Accepted,
    #[display("partially_filled")]
    PartiallyFilled,
    #[display("filled")]
    Filled,
    #[display("cancelled")]
    Cancelled,
    #[display("rejected")]
    Rejected,
    #[display("expired")]
    Expired,
}

/// Caller input to order placement. `client_order_id` is the idempotency key:
/// submitting the same intent twice returns the same [`OrderState`] unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub run_id: Uuid,
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    #[serde(with = "engine_integration::decimal")]
    pub qty: Decimal,
    #[serde(with = "engine_integration::decimal::option")]
    pub limit_price: Option<Decimal>,
    #[serde(with = "engine_integration::decimal::option")]
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
}

/// Authoritative local view of an order: the intent plus everything learned
/// from the exchange since.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderState {
    pub id: Uuid,
    pub run_id: Uuid,
    pub client_order_id: String,
    pub exchange_order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    #[serde(with = "engine_integration::decimal")]
    pub qty: Decimal,
    #[serde(with = "engine_integration::decimal::option")]
    pub limit_price: Option<Decimal>,
    #[serde(with = "engine_integration::decimal::option")]
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    #[serde(with = "engine_integration::decimal")]
    pub filled_qty: Decimal,
    #[serde(with = "engine_integration::decimal::option")]
    pub filled_avg_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub filled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub reject_reason: Option<String>,
}

impl OrderState {
    pub fn from_intent(intent: &OrderIntent, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id: intent.run_id,
            client_order_id: intent.client_order_id.clone(),
            exchange_order_id: None,
            symbol: intent.symbol.clone(),
            side: intent.side,
            order_type: intent.order_type,
            qty: intent.qty,
            limit_price: intent.limit_price,
            stop_price: intent.stop_price,
            time_in_force: intent.time_in_force,
            status: OrderStatus::Pending,
            filled_qty: Decimal::ZERO,
            filled_avg_price: None,
            created_at: now,
            submitted_at: None,
            filled_at: None,
            cancelled_at: None,
            error_code: None,
            reject_reason: None,
        }
    }
}

/// One execution slice of an order. Fills for one order sum to `filled_qty`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: Uuid,
    #[serde(with = "engine_integration::decimal")]
    pub qty: Decimal,
    #[serde(with = "engine_integration::decimal")]
    pub price: Decimal,
    #[serde(with = "engine_integration::decimal")]
    pub commission: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    #[display("long")]
    Long,
    #[display("short")]
    Short,
}

/// Derived view of a symbol's current exposure, as exposed to callers.
/// `qty` is always non-negative here; direction is carried in `side`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    #[serde(with = "engine_integration::decimal")]
    pub qty: Decimal,
    pub side: PositionSide,
    #[serde(with = "engine_integration::decimal")]
    pub avg_entry_price: Decimal,
    #[serde(with = "engine_integration::decimal")]
    pub market_value: Decimal,
    #[serde(with = "engine_integration::decimal")]
    pub unrealized_pnl: Decimal,
    #[serde(with = "engine_integration::decimal")]
    pub realized_pnl: Decimal,
}

/// `(symbol, timeframe, timestamp)` uniquely identifies a bar; later writes
/// for the same key are skipped, not overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    #[serde(with = "engine_integration::decimal")]
    pub open: Decimal,
    #[serde(with = "engine_integration::decimal")]
    pub high: Decimal,
    #[serde(with = "engine_integration::decimal")]
    pub low: Decimal,
    #[serde(with = "engine_integration::decimal")]
    pub close: Decimal,
    #[serde(with = "engine_integration::decimal")]
    pub volume: Decimal,
}

/// Outcome of [`crate::adapter::ExchangeAdapter::submit_order`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub success: bool,
    pub exchange_order_id: Option<String>,
    pub status: OrderStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}
