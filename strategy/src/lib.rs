#![forbid(unsafe_code)]
#![warn(unused, clippy::cognitive_complexity, clippy::unused_self, missing_debug_implementations, rust_2018_idioms)]

//! Binds strategies to runs and rewrites their mode-neutral actions into
//! domain-specific events. [`strategy::Strategy`] is the contract a
//! strategy implements; [`runner::StrategyRunner`] drives one instance per
//! run; [`router::DomainRouter`] is the single subscriber that translates
//! `strategy.*` events into `backtest.*` or `live.*` ones.

pub mod action;
pub mod error;
pub mod router;
pub mod runner;
pub mod strategy;

pub use action::Action;
pub use error::StrategyError;
pub use router::{DomainRouter, RunMode, RunModeLookup};
pub use runner::StrategyRunner;
pub use strategy::Strategy;
