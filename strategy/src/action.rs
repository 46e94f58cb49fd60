use engine_execution::{OrderType, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a [`crate::Strategy`] asks the runner to do on its behalf. Actions
/// are mode-neutral: the runner has no idea whether the run is a backtest
/// or a live account, and neither does the strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Action {
    /// Request the latest `lookback` bars for `symbol`.
    FetchWindow { symbol: String, lookback: usize },
    /// Submit an order.
    PlaceOrder {
        symbol: String,
        side: Side,
        qty: Decimal,
        order_type: OrderType,
        #[serde(with = "engine_integration::decimal::option", default)]
        limit_price: Option<Decimal>,
        #[serde(with = "engine_integration::decimal::option", default)]
        stop_price: Option<Decimal>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FetchWindowPayload {
    pub symbol: String,
    pub lookback: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PlaceRequestPayload {
    pub symbol: String,
    pub side: Side,
    #[serde(with = "engine_integration::decimal")]
    pub qty: Decimal,
    pub order_type: OrderType,
    #[serde(with = "engine_integration::decimal::option", default)]
    pub limit_price: Option<Decimal>,
    #[serde(with = "engine_integration::decimal::option", default)]
    pub stop_price: Option<Decimal>,
}

impl Action {
    pub(crate) fn event_type(&self) -> &'static str {
        match self {
            Action::FetchWindow { .. } => "strategy.FetchWindow",
            Action::PlaceOrder { .. } => "strategy.PlaceRequest",
        }
    }

    pub(crate) fn to_payload(&self) -> serde_json::Value {
        match self {
            Action::FetchWindow { symbol, lookback } => {
                serde_json::to_value(FetchWindowPayload { symbol: symbol.clone(), lookback: *lookback })
                    .expect("Action payloads are always serializable")
            }
            Action::PlaceOrder { symbol, side, qty, order_type, limit_price, stop_price } => {
                serde_json::to_value(PlaceRequestPayload {
                    symbol: symbol.clone(),
                    side: *side,
                    qty: *qty,
                    order_type: *order_type,
                    limit_price: *limit_price,
                    stop_price: *stop_price,
                })
                .expect("Action payloads are always serializable")
            }
        }
    }
}
