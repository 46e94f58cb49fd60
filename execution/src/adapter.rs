use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::types::{Bar, OrderIntent, OrderState, Position, SubmitOutcome};

/// Cash and buying power as reported by the exchange, independent of any
/// locally tracked position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    #[serde(with = "engine_integration::decimal")]
    pub cash: Decimal,
    #[serde(with = "engine_integration::decimal")]
    pub buying_power: Decimal,
}

/// Optional filters for [`ExchangeAdapter::list_orders`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub symbol: Option<String>,
    pub open_only: bool,
}

/// Everything a Live Execution Service needs from a broker or exchange.
/// Implementations own the wire protocol; this trait only describes the
/// operations the service drives.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    async fn connect(&self) -> Result<(), ExecutionError>;

    async fn disconnect(&self) -> Result<(), ExecutionError>;

    fn is_connected(&self) -> bool;

    async fn submit_order(&self, intent: &OrderIntent) -> Result<SubmitOutcome, ExecutionError>;

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<bool, ExecutionError>;

    async fn get_order(&self, exchange_order_id: &str) -> Result<Option<OrderState>, ExecutionError>;

    async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<OrderState>, ExecutionError>;

    async fn get_account(&self) -> Result<AccountSnapshot, ExecutionError>;

    async fn get_positions(&self) -> Result<Vec<Position>, ExecutionError>;

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, ExecutionError>;

    async fn latest_bar(&self, symbol: &str) -> Result<Option<Bar>, ExecutionError>;

    async fn historical_bars(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, ExecutionError>;
}
