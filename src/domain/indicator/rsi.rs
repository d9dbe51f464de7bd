//! Relative Strength Index.
//!
//! delta[i] = close[i] - close[i-1]
//! avg_gain / avg_loss = simple mean of gains / losses over the last `period` deltas
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//!
//! Absent until `period` deltas exist (index < period), and absent whenever
//! avg_loss is zero.

use super::{defined, Series};

pub const DEFAULT_PERIOD: usize = 14;

pub fn calculate_rsi(closes: &[f64], period: usize) -> Series {
    let mut out: Series = vec![None; closes.len()];
    if period == 0 {
        return out;
    }

    for (i, slot) in out.iter_mut().enumerate().skip(period) {
        let mut gain_sum = 0.0;
        let mut loss_sum = 0.0;
        for j in (i + 1 - period)..=i {
            let delta = closes[j] - closes[j - 1];
            if delta > 0.0 {
                gain_sum += delta;
            } else {
                loss_sum -= delta;
            }
        }
        let avg_gain = gain_sum / period as f64;
        let avg_loss = loss_sum / period as f64;
        if avg_loss == 0.0 {
            continue;
        }
        let rs = avg_gain / avg_loss;
        *slot = defined(100.0 - 100.0 / (1.0 + rs));
    }

    out
}
