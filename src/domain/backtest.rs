//! Historical simulation.
//!
//! Walks bars in order with a single-position account. At each bar at most
//! one transition happens: a buy check while FLAT, a sell check while LONG.
//! Fills are at the bar's close. Equity is recorded for every bar, and an
//! open position is left open at the end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::account::{AccountState, PositionState};
use crate::domain::bar::Bar;
use crate::domain::condition::Side;
use crate::domain::error::SigtraderError;
use crate::domain::indicator::EnrichedFrame;
use crate::domain::metrics::Metrics;
use crate::domain::rule_set::RuleSet;

pub const DEFAULT_INITIAL_BALANCE: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: Side,
    pub ts: DateTime<Utc>,
    pub price: f64,
    pub qty: f64,
    pub fee: f64,
    /// Realised profit; zero on entries.
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub ts: DateTime<Utc>,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    #[serde(flatten)]
    pub metrics: Metrics,
}

/// Compact form stored with a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub equity_curve: Vec<EquityPoint>,
    pub trade_count: usize,
    #[serde(flatten)]
    pub metrics: Metrics,
}

impl BacktestResult {
    pub fn summary(&self) -> BacktestSummary {
        BacktestSummary {
            equity_curve: self.equity_curve.clone(),
            trade_count: self.trades.len(),
            metrics: self.metrics.clone(),
        }
    }

    pub fn final_equity(&self) -> Option<f64> {
        self.equity_curve.last().map(|p| p.equity)
    }
}

pub fn run_backtest(
    bars: &[Bar],
    rule_set: &RuleSet,
    initial_balance: f64,
) -> Result<BacktestResult, SigtraderError> {
    if !initial_balance.is_finite() || initial_balance <= 0.0 {
        return Err(SigtraderError::InvalidInput {
            reason: format!("initial balance must be a positive number, got {initial_balance}"),
        });
    }
    if bars.is_empty() {
        return Err(SigtraderError::NoData {
            what: "backtest: empty bar sequence".into(),
        });
    }

    let frame = EnrichedFrame::compute(bars.to_vec());
    let mut account = AccountState::new(initial_balance);
    let mut trades = Vec::new();
    let mut equity_curve = Vec::with_capacity(frame.len());

    for (idx, bar) in frame.bars().iter().enumerate() {
        let price = bar.close;
        match account.state() {
            PositionState::Flat if rule_set.should_buy(&frame, idx) => {
                if let Some(qty) = account.buy_all(price) {
                    trades.push(Trade {
                        side: Side::Buy,
                        ts: bar.ts,
                        price,
                        qty,
                        fee: 0.0,
                        pnl: 0.0,
                    });
                }
            }
            PositionState::Long if rule_set.should_sell(&frame, idx) => {
                if let Some(exit) = account.sell_all(price) {
                    trades.push(Trade {
                        side: Side::Sell,
                        ts: bar.ts,
                        price,
                        qty: exit.qty,
                        fee: 0.0,
                        pnl: exit.pnl,
                    });
                }
            }
            _ => {}
        }

        equity_curve.push(EquityPoint {
            ts: bar.ts,
            equity: account.equity(price),
        });
    }

    let metrics = Metrics::compute(&trades, &equity_curve, initial_balance);
    Ok(BacktestResult {
        trades,
        equity_curve,
        metrics,
    })
}
