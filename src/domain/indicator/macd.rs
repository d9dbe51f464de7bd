//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9. All EMAs are seeded with
//! the first value, so every column is defined from the first bar.

use super::ema::{ewm, span_alpha};
use super::{defined, Series};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, Default)]
pub struct MacdColumns {
    pub line: Series,
    pub signal: Series,
    pub histogram: Series,
}

pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdColumns {
    let ema_fast = ewm(closes, span_alpha(fast));
    let ema_slow = ewm(closes, span_alpha(slow));
    let line: Vec<f64> = ema_fast.iter().zip(&ema_slow).map(|(f, s)| f - s).collect();
    let signal_line = ewm(&line, span_alpha(signal));

    MacdColumns {
        histogram: line
            .iter()
            .zip(&signal_line)
            .map(|(l, s)| defined(l - s))
            .collect(),
        line: line.iter().copied().map(defined).collect(),
        signal: signal_line.into_iter().map(defined).collect(),
    }
}
