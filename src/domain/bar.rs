//! Price bar representation.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// close - open; positive for a bullish bar.
    pub fn body(&self) -> f64 {
        self.close - self.open
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// high - max(open, close)
    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Convert an exchange millisecond timestamp into a UTC instant.
pub fn ts_from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Sort ascending by timestamp and drop duplicate timestamps, keeping the first.
pub fn normalize(mut bars: Vec<Bar>) -> Vec<Bar> {
    bars.sort_by_key(|b| b.ts);
    bars.dedup_by_key(|b| b.ts);
    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar {
            ts: ts_from_millis(1_700_000_000_000).unwrap(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn typical_price() {
        let bar = sample_bar();
        let expected = (110.0 + 90.0 + 105.0) / 3.0;
        assert!((bar.typical_price() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn body_and_shadow() {
        let bar = sample_bar();
        assert!((bar.body() - 5.0).abs() < f64::EPSILON);
        assert!((bar.range() - 20.0).abs() < f64::EPSILON);
        // high 110 - max(100, 105) = 5
        assert!((bar.upper_shadow() - 5.0).abs() < f64::EPSILON);
        assert!(bar.is_bullish());
        assert!(!bar.is_bearish());
    }

    #[test]
    fn normalize_sorts_and_dedups() {
        let mut late = sample_bar();
        late.ts = ts_from_millis(1_700_000_060_000).unwrap();
        let early = sample_bar();
        let mut dup = sample_bar();
        dup.close = 1.0;

        let bars = normalize(vec![late.clone(), early.clone(), dup]);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].ts, early.ts);
        assert!((bars[0].close - 105.0).abs() < f64::EPSILON);
        assert_eq!(bars[1].ts, late.ts);
    }

    #[test]
    fn millis_round_trip() {
        let ts = ts_from_millis(1_700_000_000_123).unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_123);
    }
}
