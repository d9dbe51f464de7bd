//! Live trade ledger logic.
//!
//! A live instance keeps no position counter. Its net position is the signed
//! sum of its recorded trades, recomputed every cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::condition::Side;

pub const STATUS_SENT: &str = "SENT";
pub const RECENT_TRADE_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveTrade {
    pub instance_id: i64,
    pub side: Side,
    pub ts: DateTime<Utc>,
    pub price: f64,
    pub qty: f64,
    pub order_id: Option<String>,
    pub status: String,
    /// Always absent for live trades; kept for parity with the backtest ledger.
    pub pnl: Option<f64>,
    /// Raw exchange response for the submission.
    pub raw_response: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEquitySnapshot {
    pub ts: DateTime<Utc>,
    pub equity: f64,
}

/// Signed sum of trade quantities: BUY adds, SELL subtracts.
pub fn net_position(trades: &[LiveTrade]) -> f64 {
    trades.iter().map(|t| t.side.signed(t.qty)).sum()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderIntent {
    pub side: Side,
    pub size: f64,
}

/// Turn the last-bar signals and the current net position into at most one
/// order. Buy takes precedence when both signals fire and the book is flat.
pub fn decide_order(buy: bool, sell: bool, net: f64, unit_size: f64) -> Option<OrderIntent> {
    if buy && net <= 0.0 {
        Some(OrderIntent {
            side: Side::Buy,
            size: unit_size,
        })
    } else if sell && net > 0.0 {
        Some(OrderIntent {
            side: Side::Sell,
            size: net.abs(),
        })
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSummary {
    pub instance_id: i64,
    pub total_trades: usize,
    pub buy_count: usize,
    pub sell_count: usize,
    pub current_position: f64,
    /// Most recent first.
    pub recent_trades: Vec<LiveTrade>,
}

/// Derive a summary from the full ledger of one instance.
pub fn summarize(instance_id: i64, trades: &[LiveTrade]) -> InstanceSummary {
    let buy_count = trades.iter().filter(|t| t.side == Side::Buy).count();
    let mut recent: Vec<LiveTrade> = trades.to_vec();
    recent.sort_by(|a, b| b.ts.cmp(&a.ts));
    recent.truncate(RECENT_TRADE_LIMIT);

    InstanceSummary {
        instance_id,
        total_trades: trades.len(),
        buy_count,
        sell_count: trades.len() - buy_count,
        current_position: net_position(trades),
        recent_trades: recent,
    }
}
