//! sigtrader: indicator-driven signal backtester and live trading scheduler.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], the polling scheduler in [`live`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod live;
pub mod cli;
