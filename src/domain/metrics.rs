//! Backtest performance metrics.
//!
//! All percentages are on a 0-100 scale.

use serde::{Deserialize, Serialize};

use crate::domain::backtest::{EquityPoint, Trade};
use crate::domain::condition::Side;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_return: f64,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub profit_factor: f64,
}

impl Metrics {
    pub fn compute(trades: &[Trade], equity_curve: &[EquityPoint], initial_balance: f64) -> Self {
        let Some(last) = equity_curve.last() else {
            return Self::default();
        };

        let total_return = (last.equity - initial_balance) / initial_balance * 100.0;
        let (win_rate, profit_factor) = compute_trade_stats(trades);

        Metrics {
            total_return,
            win_rate,
            sharpe_ratio: compute_sharpe(equity_curve),
            max_drawdown: compute_drawdown(equity_curve, initial_balance),
            profit_factor,
        }
    }
}

/// Win rate over closing trades, and gross profit / gross loss (0 when
/// there are no losing trades).
fn compute_trade_stats(trades: &[Trade]) -> (f64, f64) {
    let sells: Vec<&Trade> = trades.iter().filter(|t| t.side == Side::Sell).collect();
    if sells.is_empty() {
        return (0.0, 0.0);
    }

    let wins = sells.iter().filter(|t| t.pnl > 0.0).count();
    let win_rate = wins as f64 / sells.len() as f64 * 100.0;

    let total_profit: f64 = sells.iter().map(|t| t.pnl).filter(|p| *p > 0.0).sum();
    let total_loss: f64 = sells
        .iter()
        .map(|t| t.pnl)
        .filter(|p| *p < 0.0)
        .sum::<f64>()
        .abs();
    let profit_factor = if total_loss > 0.0 {
        total_profit / total_loss
    } else {
        0.0
    };

    (win_rate, profit_factor)
}

/// Largest percentage decline from the running peak, with the peak seeded
/// at the initial balance.
fn compute_drawdown(equity_curve: &[EquityPoint], initial_balance: f64) -> f64 {
    let mut peak = initial_balance;
    let mut max_dd = 0.0_f64;

    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        }
        if peak > 0.0 {
            let dd = (peak - point.equity) / peak * 100.0;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }

    max_dd
}

/// mean / population stddev of bar-over-bar returns, annualised by sqrt(252).
/// Returns whose previous equity is not positive are skipped.
fn compute_sharpe(equity_curve: &[EquityPoint]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter(|w| w[0].equity > 0.0)
        .map(|w| (w[1].equity - w[0].equity) / w[0].equity)
        .collect();

    if returns.is_empty() {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    if std_dev > 0.0 {
        mean / std_dev * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    }
}
