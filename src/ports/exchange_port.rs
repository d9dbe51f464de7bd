//! Exchange gateway port trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::bar::{self, ts_from_millis, Bar};
use crate::domain::condition::Side;
use crate::domain::error::SigtraderError;

/// One candle as the exchange reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleRow {
    pub ts_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl CandleRow {
    pub fn to_bar(&self) -> Option<Bar> {
        Some(Bar {
            ts: ts_from_millis(self.ts_ms)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        })
    }
}

/// Convert exchange rows (any order) into an ascending bar sequence.
pub fn bars_from_rows(rows: &[CandleRow]) -> Vec<Bar> {
    bar::normalize(rows.iter().filter_map(CandleRow::to_bar).collect())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyBalance {
    pub ccy: String,
    pub eq: Option<f64>,
    pub eq_usd: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountOverview {
    pub total_eq: Option<f64>,
    pub details: Vec<CurrencyBalance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Market => "market",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderReceipt {
    pub order_id: Option<String>,
    pub raw: serde_json::Value,
}

/// Candle page request. `before`/`after` are millisecond cursors: `after`
/// asks for rows older than the timestamp, `before` for newer ones.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleQuery<'a> {
    pub inst_id: &'a str,
    pub timeframe: &'a str,
    pub limit: usize,
    pub before: Option<i64>,
    pub after: Option<i64>,
}

impl<'a> CandleQuery<'a> {
    pub fn latest(inst_id: &'a str, timeframe: &'a str, limit: usize) -> Self {
        Self {
            inst_id,
            timeframe,
            limit,
            before: None,
            after: None,
        }
    }
}

#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Recent candles, newest first.
    async fn get_candles(&self, query: &CandleQuery<'_>) -> Result<Vec<CandleRow>, SigtraderError>;

    /// Archived candles for bulk downloads, newest first.
    async fn get_history_candles(
        &self,
        query: &CandleQuery<'_>,
    ) -> Result<Vec<CandleRow>, SigtraderError>;

    async fn get_account_overview(&self) -> Result<AccountOverview, SigtraderError>;

    async fn place_order(
        &self,
        inst_id: &str,
        side: Side,
        size: f64,
        order_type: OrderType,
    ) -> Result<OrderReceipt, SigtraderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ts_ms: i64, close: f64) -> CandleRow {
        CandleRow {
            ts_ms,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn rows_are_sorted_ascending() {
        let rows = vec![row(3_000, 3.0), row(1_000, 1.0), row(2_000, 2.0)];
        let bars = bars_from_rows(&rows);
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn empty_rows_give_no_bars() {
        assert!(bars_from_rows(&[]).is_empty());
    }
}
