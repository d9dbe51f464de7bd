//! CSV bar file adapter.
//!
//! Files are named `{inst_id}_{timeframe}.csv` with a `ts,open,high,low,close,volume`
//! header. `ts` is either epoch milliseconds or an RFC 3339 timestamp.

use crate::domain::bar::{self, ts_from_millis, Bar};
use crate::domain::error::SigtraderError;
use crate::ports::candle_port::CandleStore;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, inst_id: &str, timeframe: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", inst_id, timeframe))
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, SigtraderError> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return ts_from_millis(ms).ok_or_else(|| SigtraderError::InvalidInput {
            reason: format!("timestamp out of range: {}", ms),
        });
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SigtraderError::InvalidInput {
            reason: format!("invalid timestamp '{}': {}", raw, e),
        })
}

fn parse_field(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64, SigtraderError> {
    record
        .get(idx)
        .ok_or_else(|| SigtraderError::InvalidInput {
            reason: format!("missing {} column", name),
        })?
        .trim()
        .parse()
        .map_err(|e| SigtraderError::InvalidInput {
            reason: format!("invalid {} value: {}", name, e),
        })
}

/// Read every bar in a CSV file, sorted ascending with duplicate timestamps dropped.
pub fn read_bars(path: &Path) -> Result<Vec<Bar>, SigtraderError> {
    let content = fs::read_to_string(path).map_err(|e| SigtraderError::NoData {
        what: format!("{} ({})", path.display(), e),
    })?;

    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let mut bars = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| SigtraderError::InvalidInput {
            reason: format!("CSV parse error: {}", e),
        })?;

        let ts_str = record.get(0).ok_or_else(|| SigtraderError::InvalidInput {
            reason: "missing ts column".into(),
        })?;

        bars.push(Bar {
            ts: parse_ts(ts_str)?,
            open: parse_field(&record, 1, "open")?,
            high: parse_field(&record, 2, "high")?,
            low: parse_field(&record, 3, "low")?,
            close: parse_field(&record, 4, "close")?,
            volume: parse_field(&record, 5, "volume")?,
        });
    }

    Ok(bar::normalize(bars))
}

/// Write bars with millisecond timestamps.
pub fn write_bars(path: &Path, bars: &[Bar]) -> Result<(), SigtraderError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| SigtraderError::InvalidInput {
        reason: format!("failed to open {}: {}", path.display(), e),
    })?;
    let to_err = |e: csv::Error| SigtraderError::InvalidInput {
        reason: format!("CSV write error: {}", e),
    };
    wtr.write_record(["ts", "open", "high", "low", "close", "volume"])
        .map_err(to_err)?;
    for b in bars {
        wtr.write_record([
            b.ts.timestamp_millis().to_string(),
            b.open.to_string(),
            b.high.to_string(),
            b.low.to_string(),
            b.close.to_string(),
            b.volume.to_string(),
        ])
        .map_err(to_err)?;
    }
    wtr.flush()?;
    Ok(())
}

impl CandleStore for CsvAdapter {
    fn fetch_bars(
        &self,
        inst_id: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, SigtraderError> {
        let bars = read_bars(&self.csv_path(inst_id, timeframe))?;
        Ok(bars
            .into_iter()
            .filter(|b| b.ts >= start && b.ts <= end)
            .collect())
    }

    fn store_bars(&self, inst_id: &str, timeframe: &str, bars: &[Bar]) -> Result<usize, SigtraderError> {
        let path = self.csv_path(inst_id, timeframe);
        let mut existing = if path.exists() {
            read_bars(&path)?
        } else {
            Vec::new()
        };
        let before = existing.len();
        existing.extend_from_slice(bars);
        let merged = bar::normalize(existing);
        let inserted = merged.len() - before;
        write_bars(&path, &merged)?;
        Ok(inserted)
    }

    fn data_range(
        &self,
        inst_id: &str,
        timeframe: &str,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>, usize)>, SigtraderError> {
        let path = self.csv_path(inst_id, timeframe);
        if !path.exists() {
            return Ok(None);
        }
        let bars = read_bars(&path)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.ts, last.ts, bars.len())),
            _ => None,
        })
    }
}
