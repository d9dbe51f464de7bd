//! Port traits at the I/O seams.

pub mod backtest_port;
pub mod candle_port;
pub mod config_port;
pub mod exchange_port;
pub mod ledger_port;
