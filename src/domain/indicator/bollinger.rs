//! Bollinger Bands.
//!
//! Middle = SMA(n), Upper/Lower = Middle +/- k * sample stddev(n),
//! Width = (Upper - Lower) / Middle.
//!
//! Default parameters: n=20, k=2.0. The bands are absent while the window
//! holds a single bar.

use super::rolling::{rolling_mean, rolling_std};
use super::{defined, Series};

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, Default)]
pub struct BollingerColumns {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
    pub width: Series,
}

pub fn calculate_bollinger(closes: &[f64], period: usize, multiplier: f64) -> BollingerColumns {
    let middle = rolling_mean(closes, period);
    let std = rolling_std(closes, period);

    let mut cols = BollingerColumns {
        middle: middle.iter().copied().map(defined).collect(),
        ..Default::default()
    };
    for (m, s) in middle.iter().zip(&std) {
        let bands = s.map(|s| (m + multiplier * s, m - multiplier * s));
        cols.upper.push(bands.and_then(|(u, _)| defined(u)));
        cols.lower.push(bands.and_then(|(_, l)| defined(l)));
        cols.width
            .push(bands.and_then(|(u, l)| if *m == 0.0 { None } else { defined((u - l) / m) }));
    }
    cols
}
