//! Stored bar access port trait.

use chrono::{DateTime, Utc};

use crate::domain::bar::Bar;
use crate::domain::error::SigtraderError;

pub trait CandleStore {
    /// Bars with `start <= ts <= end`, ascending by timestamp.
    fn fetch_bars(
        &self,
        inst_id: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, SigtraderError>;

    /// Insert bars, skipping timestamps already stored. Returns the number inserted.
    fn store_bars(&self, inst_id: &str, timeframe: &str, bars: &[Bar]) -> Result<usize, SigtraderError>;

    /// Earliest and latest stored timestamps plus the bar count.
    fn data_range(
        &self,
        inst_id: &str,
        timeframe: &str,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>, usize)>, SigtraderError>;
}
