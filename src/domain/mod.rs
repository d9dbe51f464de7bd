//! Core domain types and logic.

pub mod account;
pub mod backtest;
pub mod backtest_job;
pub mod bar;
pub mod condition;
pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod ledger;
pub mod metrics;
pub mod rule_set;
pub mod signal;
