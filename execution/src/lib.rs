#![forbid(unsafe_code)]
#![warn(unused, clippy::cognitive_complexity, clippy::unused_self, missing_debug_implementations, rust_2018_idioms)]

//! Live order execution: a pluggable [`adapter::ExchangeAdapter`], idempotent
//! order placement and cancellation, fill ingestion, position derivation,
//! and persistence through an [`repository::OrderRepository`].

pub mod adapter;
pub mod error;
pub mod position;
pub mod repository;
pub mod service;
pub mod types;

pub use adapter::{AccountSnapshot, ExchangeAdapter, OrderFilter};
pub use error::ExecutionError;
pub use position::PositionTracker;
pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use service::{LiveExecutionService, RetryPolicy};
pub use types::{
    Bar, Fill, OrderIntent, OrderState, OrderStatus, OrderType, Position, PositionSide, Side,
    SubmitOutcome, TimeInForce,
};
