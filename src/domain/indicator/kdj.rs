//! KDJ stochastic oscillator.
//!
//! RSV = (close - lowest_low(n)) / (highest_high(n) - lowest_low(n)) * 100,
//! or 50 when the window has no range.
//! K = EMA(RSV, com=2), D = EMA(K, com=2), J = 3K - 2D.

use super::ema::{com_alpha, ewm};
use super::rolling::{rolling_max, rolling_min};
use super::{defined, Series};

pub const DEFAULT_PERIOD: usize = 9;
pub const SMOOTHING_COM: f64 = 2.0;

#[derive(Debug, Clone, Default)]
pub struct KdjColumns {
    pub k: Series,
    pub d: Series,
    pub j: Series,
}

pub fn calculate_kdj(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> KdjColumns {
    let lowest = rolling_min(lows, period);
    let highest = rolling_max(highs, period);

    let rsv: Vec<f64> = closes
        .iter()
        .zip(lowest.iter().zip(&highest))
        .map(|(c, (l, h))| {
            let range = h - l;
            if range > 0.0 {
                (c - l) / range * 100.0
            } else {
                50.0
            }
        })
        .collect();

    let alpha = com_alpha(SMOOTHING_COM);
    let k = ewm(&rsv, alpha);
    let d = ewm(&k, alpha);
    let j: Vec<f64> = k.iter().zip(&d).map(|(k, d)| 3.0 * k - 2.0 * d).collect();

    KdjColumns {
        k: k.into_iter().map(defined).collect(),
        d: d.into_iter().map(defined).collect(),
        j: j.into_iter().map(defined).collect(),
    }
}
