#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sigtrader::domain::backtest::Trade;
use sigtrader::domain::backtest_job::{BacktestRequest, BacktestRun, RunStatus};
pub use sigtrader::domain::bar::Bar;
use sigtrader::domain::bar::ts_from_millis;
use sigtrader::domain::condition::{Condition, ConditionGroup, Logic, Side, SignalParams, SignalType};
use sigtrader::domain::error::SigtraderError;
use sigtrader::domain::ledger::{AccountEquitySnapshot, LiveTrade};
use sigtrader::domain::rule_set::RuleSet;
use sigtrader::ports::backtest_port::BacktestStore;
use sigtrader::ports::candle_port::CandleStore;
use sigtrader::ports::exchange_port::{
    AccountOverview, CandleQuery, CandleRow, ExchangeGateway, OrderReceipt, OrderType,
};
use sigtrader::ports::ledger_port::TradeLedger;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const T0_MS: i64 = 1_704_067_200_000; // 2024-01-01T00:00:00Z
pub const HOUR_MS: i64 = 3_600_000;

pub fn ts(idx: usize) -> DateTime<Utc> {
    ts_from_millis(T0_MS + idx as i64 * HOUR_MS).unwrap()
}

pub fn bar_at(idx: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        ts: ts(idx),
        open,
        high,
        low,
        close,
        volume: 1000.0,
    }
}

/// Doji-like bar with a small range around `close`.
pub fn quiet_bar(idx: usize, close: f64) -> Bar {
    bar_at(idx, close, close + 0.5, close - 0.5, close)
}

pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| quiet_bar(i, c))
        .collect()
}

/// Big bullish body: open 90, close 100 within 89..101.
pub fn big_yang(idx: usize) -> Bar {
    bar_at(idx, 90.0, 101.0, 89.0, 100.0)
}

/// Big bearish body: open 130, close 120 within 119.5..131.
pub fn big_yin(idx: usize) -> Bar {
    bar_at(idx, 130.0, 131.0, 119.5, 120.0)
}

/// Exchange rows for `bars`, newest first as the exchange sends them.
pub fn rows_newest_first(bars: &[Bar]) -> Vec<CandleRow> {
    bars.iter()
        .rev()
        .map(|b| CandleRow {
            ts_ms: b.ts.timestamp_millis(),
            open: b.open,
            high: b.high,
            low: b.low,
            close: b.close,
            volume: b.volume,
        })
        .collect()
}

pub fn condition(side: Side, signal: SignalType) -> Condition {
    Condition::new(side, signal.indicator(), signal, SignalParams::default()).unwrap()
}

/// One AND group per side holding the given signals.
pub fn rule_set(buy: &[SignalType], sell: &[SignalType]) -> RuleSet {
    let group = |side, signals: &[SignalType]| ConditionGroup {
        logic: Logic::And,
        conditions: signals.iter().map(|&s| condition(side, s)).collect(),
    };
    RuleSet {
        buy_groups: vec![group(Side::Buy, buy)],
        sell_groups: vec![group(Side::Sell, sell)],
    }
}

/// Big yang buys, big yin sells.
pub fn candle_rules() -> RuleSet {
    rule_set(&[SignalType::CandleBigYang], &[SignalType::CandleBigYin])
}

// ---------------------------------------------------------------------------
// Exchange gateway
// ---------------------------------------------------------------------------

pub struct MockGateway {
    pub candles: Mutex<Vec<CandleRow>>,
    pub history_pages: Mutex<VecDeque<Vec<CandleRow>>>,
    pub history_queries: Mutex<Vec<(Option<i64>, Option<i64>)>>,
    pub total_eq: Mutex<Option<f64>>,
    pub candle_delay: Mutex<Option<Duration>>,
    pub fail_candles: AtomicBool,
    pub fail_orders: AtomicBool,
    pub fail_balance: AtomicBool,
    pub candle_calls: AtomicUsize,
    pub balance_calls: AtomicUsize,
    pub orders: Mutex<Vec<(String, Side, f64)>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            candles: Mutex::new(Vec::new()),
            history_pages: Mutex::new(VecDeque::new()),
            history_queries: Mutex::new(Vec::new()),
            total_eq: Mutex::new(Some(1000.0)),
            candle_delay: Mutex::new(None),
            fail_candles: AtomicBool::new(false),
            fail_orders: AtomicBool::new(false),
            fail_balance: AtomicBool::new(false),
            candle_calls: AtomicUsize::new(0),
            balance_calls: AtomicUsize::new(0),
            orders: Mutex::new(Vec::new()),
        }
    }

    pub fn with_bars(self, bars: &[Bar]) -> Self {
        self.set_bars(bars);
        self
    }

    pub fn with_candle_delay(self, delay: Duration) -> Self {
        *self.candle_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn set_bars(&self, bars: &[Bar]) {
        *self.candles.lock().unwrap() = rows_newest_first(bars);
    }

    pub fn push_history_page(&self, bars: &[Bar]) {
        self.history_pages
            .lock()
            .unwrap()
            .push_back(rows_newest_first(bars));
    }

    pub fn candle_calls(&self) -> usize {
        self.candle_calls.load(Ordering::SeqCst)
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn get_candles(&self, query: &CandleQuery<'_>) -> Result<Vec<CandleRow>, SigtraderError> {
        self.candle_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.candle_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_candles.load(Ordering::SeqCst) {
            return Err(SigtraderError::Network {
                reason: "connection reset".into(),
            });
        }
        let rows = self.candles.lock().unwrap();
        Ok(rows.iter().take(query.limit).cloned().collect())
    }

    async fn get_history_candles(
        &self,
        query: &CandleQuery<'_>,
    ) -> Result<Vec<CandleRow>, SigtraderError> {
        self.history_queries
            .lock()
            .unwrap()
            .push((query.before, query.after));
        Ok(self
            .history_pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn get_account_overview(&self) -> Result<AccountOverview, SigtraderError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_balance.load(Ordering::SeqCst) {
            return Err(SigtraderError::Network {
                reason: "balance timeout".into(),
            });
        }
        Ok(AccountOverview {
            total_eq: *self.total_eq.lock().unwrap(),
            details: Vec::new(),
        })
    }

    async fn place_order(
        &self,
        inst_id: &str,
        side: Side,
        size: f64,
        _order_type: OrderType,
    ) -> Result<OrderReceipt, SigtraderError> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(SigtraderError::Exchange {
                code: "51008".into(),
                message: "insufficient balance".into(),
            });
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push((inst_id.to_string(), side, size));
        let order_id = format!("ord-{}", orders.len());
        Ok(OrderReceipt {
            order_id: Some(order_id.clone()),
            raw: serde_json::json!({"code": "0", "data": [{"ordId": order_id, "sCode": "0"}]}),
        })
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryLedger {
    pub trades: Mutex<Vec<LiveTrade>>,
    pub snapshots: Mutex<Vec<AccountEquitySnapshot>>,
    pub fail_trades: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.lock().unwrap().len()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }
}

impl TradeLedger for MemoryLedger {
    fn trades_for_instance(&self, instance_id: i64) -> Result<Vec<LiveTrade>, SigtraderError> {
        Ok(self
            .trades
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.instance_id == instance_id)
            .cloned()
            .collect())
    }

    fn append_trade(&self, trade: &LiveTrade) -> Result<i64, SigtraderError> {
        if self.fail_trades.load(Ordering::SeqCst) {
            return Err(SigtraderError::DatabaseQuery {
                reason: "disk full".into(),
            });
        }
        let mut trades = self.trades.lock().unwrap();
        trades.push(trade.clone());
        Ok(trades.len() as i64)
    }

    fn append_snapshot(&self, snapshot: &AccountEquitySnapshot) -> Result<(), SigtraderError> {
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCandleStore {
    pub bars: Mutex<HashMap<(String, String), Vec<Bar>>>,
}

impl MemoryCandleStore {
    pub fn with_bars(inst_id: &str, timeframe: &str, bars: Vec<Bar>) -> Self {
        let store = Self::default();
        store
            .bars
            .lock()
            .unwrap()
            .insert((inst_id.to_string(), timeframe.to_string()), bars);
        store
    }
}

impl CandleStore for MemoryCandleStore {
    fn fetch_bars(
        &self,
        inst_id: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, SigtraderError> {
        Ok(self
            .bars
            .lock()
            .unwrap()
            .get(&(inst_id.to_string(), timeframe.to_string()))
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.ts >= start && b.ts <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn store_bars(&self, inst_id: &str, timeframe: &str, bars: &[Bar]) -> Result<usize, SigtraderError> {
        let mut all = self.bars.lock().unwrap();
        let entry = all
            .entry((inst_id.to_string(), timeframe.to_string()))
            .or_default();
        let before = entry.len();
        entry.extend_from_slice(bars);
        let merged = sigtrader::domain::bar::normalize(std::mem::take(entry));
        *entry = merged;
        Ok(entry.len() - before)
    }

    fn data_range(
        &self,
        inst_id: &str,
        timeframe: &str,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>, usize)>, SigtraderError> {
        Ok(self
            .bars
            .lock()
            .unwrap()
            .get(&(inst_id.to_string(), timeframe.to_string()))
            .and_then(|bars| Some((bars.first()?.ts, bars.last()?.ts, bars.len()))))
    }
}

#[derive(Default)]
pub struct MemoryBacktestStore {
    pub runs: Mutex<HashMap<i64, BacktestRun>>,
    pub trades: Mutex<HashMap<i64, Vec<Trade>>>,
    pub status_history: Mutex<Vec<(i64, RunStatus)>>,
}

impl BacktestStore for MemoryBacktestStore {
    fn create_run(&self, request: &BacktestRequest) -> Result<i64, SigtraderError> {
        let mut runs = self.runs.lock().unwrap();
        let id = runs.len() as i64 + 1;
        runs.insert(
            id,
            BacktestRun {
                id,
                inst_id: request.inst_id.clone(),
                timeframe: request.timeframe.clone(),
                start: request.start,
                end: request.end,
                initial_balance: request.initial_balance,
                status: RunStatus::Pending,
                result_json: None,
            },
        );
        self.status_history
            .lock()
            .unwrap()
            .push((id, RunStatus::Pending));
        Ok(id)
    }

    fn update_status(
        &self,
        run_id: i64,
        status: RunStatus,
        result_json: Option<&str>,
    ) -> Result<(), SigtraderError> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .get_mut(&run_id)
            .ok_or_else(|| SigtraderError::DatabaseQuery {
                reason: format!("run {run_id} not found"),
            })?;
        run.status = status;
        if let Some(json) = result_json {
            run.result_json = Some(json.to_string());
        }
        self.status_history.lock().unwrap().push((run_id, status));
        Ok(())
    }

    fn record_trades(&self, run_id: i64, trades: &[Trade]) -> Result<(), SigtraderError> {
        self.trades
            .lock()
            .unwrap()
            .entry(run_id)
            .or_default()
            .extend_from_slice(trades);
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> Result<Option<BacktestRun>, SigtraderError> {
        Ok(self.runs.lock().unwrap().get(&run_id).cloned())
    }
}
