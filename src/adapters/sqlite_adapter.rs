//! SQLite storage adapter: stored klines, the live trade ledger, and backtest runs.
//!
//! Timestamps are stored as epoch milliseconds.

use crate::domain::backtest::Trade;
use crate::domain::backtest_job::{BacktestRequest, BacktestRun, RunStatus};
use crate::domain::bar::{ts_from_millis, Bar};
use crate::domain::condition::Side;
use crate::domain::error::SigtraderError;
use crate::domain::ledger::{AccountEquitySnapshot, LiveTrade};
use crate::ports::backtest_port::BacktestStore;
use crate::ports::candle_port::CandleStore;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::TradeLedger;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS klines (
    inst_id TEXT NOT NULL,
    timeframe TEXT NOT NULL,
    ts INTEGER NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume REAL NOT NULL,
    PRIMARY KEY (inst_id, timeframe, ts)
);
CREATE TABLE IF NOT EXISTS live_trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    instance_id INTEGER NOT NULL,
    side TEXT NOT NULL,
    ts INTEGER NOT NULL,
    price REAL NOT NULL,
    qty REAL NOT NULL,
    order_id TEXT,
    status TEXT NOT NULL,
    pnl REAL,
    raw_response TEXT
);
CREATE INDEX IF NOT EXISTS idx_live_trades_instance ON live_trades(instance_id);
CREATE TABLE IF NOT EXISTS account_equity_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ts INTEGER NOT NULL,
    equity REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS backtests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    inst_id TEXT NOT NULL,
    timeframe TEXT NOT NULL,
    start_ts INTEGER NOT NULL,
    end_ts INTEGER NOT NULL,
    initial_balance REAL NOT NULL,
    strategy_json TEXT NOT NULL,
    status TEXT NOT NULL,
    result_json TEXT
);
CREATE TABLE IF NOT EXISTS backtest_trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    backtest_id INTEGER NOT NULL REFERENCES backtests(id),
    side TEXT NOT NULL,
    ts INTEGER NOT NULL,
    price REAL NOT NULL,
    qty REAL NOT NULL,
    fee REAL NOT NULL,
    pnl REAL NOT NULL
);
";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn query_err(e: rusqlite::Error) -> SigtraderError {
    SigtraderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn ts_column(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    ts_from_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))
}

fn side_column(raw: String) -> rusqlite::Result<Side> {
    raw.parse::<Side>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            raw.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SigtraderError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| SigtraderError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| SigtraderError::Database {
                    reason: e.to_string(),
                })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, SigtraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| SigtraderError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, SigtraderError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| SigtraderError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), SigtraderError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    /// Equity snapshots, oldest first.
    pub fn snapshots(&self) -> Result<Vec<AccountEquitySnapshot>, SigtraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT ts, equity FROM account_equity_snapshots ORDER BY ts ASC, id ASC")
            .map_err(query_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AccountEquitySnapshot {
                    ts: ts_column(row.get(0)?)?,
                    equity: row.get(1)?,
                })
            })
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }

    /// Trades recorded for a backtest run, in execution order.
    pub fn backtest_trades(&self, run_id: i64) -> Result<Vec<Trade>, SigtraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT side, ts, price, qty, fee, pnl FROM backtest_trades
                 WHERE backtest_id = ?1 ORDER BY id ASC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(Trade {
                    side: side_column(row.get(0)?)?,
                    ts: ts_column(row.get(1)?)?,
                    price: row.get(2)?,
                    qty: row.get(3)?,
                    fee: row.get(4)?,
                    pnl: row.get(5)?,
                })
            })
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }
}

impl CandleStore for SqliteAdapter {
    fn fetch_bars(
        &self,
        inst_id: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, SigtraderError> {
        let conn = self.conn()?;

        let query = "SELECT ts, open, high, low, close, volume
                     FROM klines
                     WHERE inst_id = ?1 AND timeframe = ?2 AND ts >= ?3 AND ts <= ?4
                     ORDER BY ts ASC";

        let mut stmt = conn.prepare(query).map_err(query_err)?;
        let rows = stmt
            .query_map(
                params![
                    inst_id,
                    timeframe,
                    start.timestamp_millis(),
                    end.timestamp_millis()
                ],
                |row| {
                    Ok(Bar {
                        ts: ts_column(row.get(0)?)?,
                        open: row.get(1)?,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                        volume: row.get(5)?,
                    })
                },
            )
            .map_err(query_err)?;

        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }

    fn store_bars(&self, inst_id: &str, timeframe: &str, bars: &[Bar]) -> Result<usize, SigtraderError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        let mut inserted = 0;
        for bar in bars {
            inserted += tx
                .execute(
                    "INSERT OR IGNORE INTO klines (inst_id, timeframe, ts, open, high, low, close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        inst_id,
                        timeframe,
                        bar.ts.timestamp_millis(),
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.volume
                    ],
                )
                .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(inserted)
    }

    fn data_range(
        &self,
        inst_id: &str,
        timeframe: &str,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>, usize)>, SigtraderError> {
        let conn = self.conn()?;

        let query = "SELECT MIN(ts), MAX(ts), COUNT(*) FROM klines WHERE inst_id = ?1 AND timeframe = ?2";

        let result: (Option<i64>, Option<i64>, i64) = conn
            .query_row(query, params![inst_id, timeframe], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(query_err)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => {
                let to_ts = |ms| {
                    ts_from_millis(ms).ok_or_else(|| SigtraderError::Database {
                        reason: format!("stored timestamp out of range: {ms}"),
                    })
                };
                Ok(Some((to_ts(min)?, to_ts(max)?, count as usize)))
            }
            _ => Ok(None),
        }
    }
}

impl TradeLedger for SqliteAdapter {
    fn trades_for_instance(&self, instance_id: i64) -> Result<Vec<LiveTrade>, SigtraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT instance_id, side, ts, price, qty, order_id, status, pnl, raw_response
                 FROM live_trades WHERE instance_id = ?1 ORDER BY ts ASC, id ASC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![instance_id], |row| {
                let raw: Option<String> = row.get(8)?;
                Ok(LiveTrade {
                    instance_id: row.get(0)?,
                    side: side_column(row.get(1)?)?,
                    ts: ts_column(row.get(2)?)?,
                    price: row.get(3)?,
                    qty: row.get(4)?,
                    order_id: row.get(5)?,
                    status: row.get(6)?,
                    pnl: row.get(7)?,
                    // unparseable payloads are dropped rather than failing the ledger read
                    raw_response: raw.and_then(|r| serde_json::from_str(&r).ok()),
                })
            })
            .map_err(query_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(query_err)
    }

    fn append_trade(&self, trade: &LiveTrade) -> Result<i64, SigtraderError> {
        let conn = self.conn()?;
        let raw = trade.raw_response.as_ref().map(|v| v.to_string());
        conn.execute(
            "INSERT INTO live_trades (instance_id, side, ts, price, qty, order_id, status, pnl, raw_response)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                trade.instance_id,
                trade.side.as_str(),
                trade.ts.timestamp_millis(),
                trade.price,
                trade.qty,
                trade.order_id,
                trade.status,
                trade.pnl,
                raw
            ],
        )
        .map_err(query_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn append_snapshot(&self, snapshot: &AccountEquitySnapshot) -> Result<(), SigtraderError> {
        self.conn()?
            .execute(
                "INSERT INTO account_equity_snapshots (ts, equity) VALUES (?1, ?2)",
                params![snapshot.ts.timestamp_millis(), snapshot.equity],
            )
            .map_err(query_err)?;
        Ok(())
    }
}

impl BacktestStore for SqliteAdapter {
    fn create_run(&self, request: &BacktestRequest) -> Result<i64, SigtraderError> {
        let strategy = request.rule_set.to_json()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO backtests (inst_id, timeframe, start_ts, end_ts, initial_balance, strategy_json, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                request.inst_id,
                request.timeframe,
                request.start.timestamp_millis(),
                request.end.timestamp_millis(),
                request.initial_balance,
                strategy,
                RunStatus::Pending.as_str()
            ],
        )
        .map_err(query_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn update_status(
        &self,
        run_id: i64,
        status: RunStatus,
        result_json: Option<&str>,
    ) -> Result<(), SigtraderError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE backtests SET status = ?1, result_json = COALESCE(?2, result_json) WHERE id = ?3",
                params![status.as_str(), result_json, run_id],
            )
            .map_err(query_err)?;
        if changed == 0 {
            return Err(SigtraderError::DatabaseQuery {
                reason: format!("backtest run {run_id} not found"),
            });
        }
        Ok(())
    }

    fn record_trades(&self, run_id: i64, trades: &[Trade]) -> Result<(), SigtraderError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for t in trades {
            tx.execute(
                "INSERT INTO backtest_trades (backtest_id, side, ts, price, qty, fee, pnl)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    run_id,
                    t.side.as_str(),
                    t.ts.timestamp_millis(),
                    t.price,
                    t.qty,
                    t.fee,
                    t.pnl
                ],
            )
            .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)
    }

    fn get_run(&self, run_id: i64) -> Result<Option<BacktestRun>, SigtraderError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, inst_id, timeframe, start_ts, end_ts, initial_balance, status, result_json
                 FROM backtests WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        ts_column(row.get(3)?)?,
                        ts_column(row.get(4)?)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(query_err)?;

        match row {
            Some((id, inst_id, timeframe, start, end, initial_balance, status, result_json)) => {
                Ok(Some(BacktestRun {
                    id,
                    inst_id,
                    timeframe,
                    start,
                    end,
                    initial_balance,
                    status: status.parse()?,
                    result_json,
                }))
            }
            None => Ok(None),
        }
    }
}
