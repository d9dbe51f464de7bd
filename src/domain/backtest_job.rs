//! Persisted backtest runs.
//!
//! A run moves PENDING -> RUNNING -> FINISHED, or to FAILED with the error
//! message stored as `{"error": "..."}`. A failed run never carries a result.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::backtest::{run_backtest, BacktestResult};
use crate::domain::error::SigtraderError;
use crate::domain::rule_set::RuleSet;
use crate::ports::backtest_port::BacktestStore;
use crate::ports::candle_port::CandleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pending,
    Running,
    Finished,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = SigtraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RunStatus::Pending),
            "RUNNING" => Ok(RunStatus::Running),
            "FINISHED" => Ok(RunStatus::Finished),
            "FAILED" => Ok(RunStatus::Failed),
            other => Err(SigtraderError::DatabaseQuery {
                reason: format!("unknown backtest status '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRequest {
    pub inst_id: String,
    pub timeframe: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub initial_balance: f64,
    pub rule_set: RuleSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRun {
    pub id: i64,
    pub inst_id: String,
    pub timeframe: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub initial_balance: f64,
    pub status: RunStatus,
    pub result_json: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletedBacktest {
    pub run_id: i64,
    pub result: BacktestResult,
}

/// Run a stored-data backtest end to end, recording its lifecycle in `runs`.
///
/// Any error after the run is created marks it FAILED and is returned; if
/// recording the failure also fails, that storage error is returned instead.
pub fn run_backtest_job(
    candles: &dyn CandleStore,
    runs: &dyn BacktestStore,
    request: &BacktestRequest,
) -> Result<CompletedBacktest, SigtraderError> {
    if request.start > request.end {
        return Err(SigtraderError::InvalidInput {
            reason: format!("start {} is after end {}", request.start, request.end),
        });
    }

    let run_id = runs.create_run(request)?;
    info!(run_id, inst_id = %request.inst_id, timeframe = %request.timeframe, "backtest created");

    match execute(candles, runs, run_id, request) {
        Ok(result) => {
            let summary = serde_json::to_string(&result.summary()).map_err(|e| {
                SigtraderError::Simulation {
                    reason: format!("failed to serialise result: {e}"),
                }
            });
            match summary {
                Ok(summary) => {
                    runs.update_status(run_id, RunStatus::Finished, Some(&summary))?;
                    info!(
                        run_id,
                        trades = result.trades.len(),
                        total_return = result.metrics.total_return,
                        "backtest finished"
                    );
                    Ok(CompletedBacktest { run_id, result })
                }
                Err(e) => fail(runs, run_id, e),
            }
        }
        Err(e) => fail(runs, run_id, e),
    }
}

fn execute(
    candles: &dyn CandleStore,
    runs: &dyn BacktestStore,
    run_id: i64,
    request: &BacktestRequest,
) -> Result<BacktestResult, SigtraderError> {
    let bars = candles.fetch_bars(&request.inst_id, &request.timeframe, request.start, request.end)?;
    if bars.is_empty() {
        return Err(SigtraderError::NoData {
            what: format!(
                "{} {} between {} and {}",
                request.inst_id, request.timeframe, request.start, request.end
            ),
        });
    }

    runs.update_status(run_id, RunStatus::Running, None)?;
    let result = run_backtest(&bars, &request.rule_set, request.initial_balance)?;
    runs.record_trades(run_id, &result.trades)?;
    Ok(result)
}

fn fail(
    runs: &dyn BacktestStore,
    run_id: i64,
    err: SigtraderError,
) -> Result<CompletedBacktest, SigtraderError> {
    warn!(run_id, error = %err, "backtest failed");
    let payload = serde_json::json!({ "error": err.to_string() }).to_string();
    runs.update_status(run_id, RunStatus::Failed, Some(&payload))?;
    Err(err)
}
