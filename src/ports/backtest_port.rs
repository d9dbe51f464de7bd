//! Backtest run persistence port trait.

use crate::domain::backtest::Trade;
use crate::domain::backtest_job::{BacktestRequest, BacktestRun, RunStatus};
use crate::domain::error::SigtraderError;

pub trait BacktestStore {
    /// Create a run in PENDING state and return its id.
    fn create_run(&self, request: &BacktestRequest) -> Result<i64, SigtraderError>;

    fn update_status(
        &self,
        run_id: i64,
        status: RunStatus,
        result_json: Option<&str>,
    ) -> Result<(), SigtraderError>;

    fn record_trades(&self, run_id: i64, trades: &[Trade]) -> Result<(), SigtraderError>;

    fn get_run(&self, run_id: i64) -> Result<Option<BacktestRun>, SigtraderError>;
}
