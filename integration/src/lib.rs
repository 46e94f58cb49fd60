#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! Low-level primitives shared by every other crate in this workspace:
//! fast collection aliases and the `serde` helper that keeps [`Decimal`]
//! values exact across envelope payload boundaries.
//!
//! [`Decimal`]: rust_decimal::Decimal

pub mod collection;
pub mod decimal;
