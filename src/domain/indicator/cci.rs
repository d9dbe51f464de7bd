//! Commodity Channel Index.
//!
//! tp = (high + low + close) / 3
//! CCI = (tp - SMA(tp, n)) / (0.015 * mean_abs_dev(tp, n)), absent when the
//! deviation is zero.

use super::rolling::{rolling_mean, rolling_mean_abs_dev};
use super::{defined, Series};

pub const DEFAULT_PERIOD: usize = 14;
const LAMBERT_CONSTANT: f64 = 0.015;

pub fn calculate_cci(typical_prices: &[f64], period: usize) -> Series {
    let ma = rolling_mean(typical_prices, period);
    let md = rolling_mean_abs_dev(typical_prices, period);

    typical_prices
        .iter()
        .zip(ma.iter().zip(&md))
        .map(|(tp, (ma, md))| {
            if *md == 0.0 {
                None
            } else {
                defined((tp - ma) / (LAMBERT_CONSTANT * md))
            }
        })
        .collect()
}
