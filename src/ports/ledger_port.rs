//! Live trade ledger port trait.

use crate::domain::error::SigtraderError;
use crate::domain::ledger::{AccountEquitySnapshot, LiveTrade};

/// Append-only store of live trades and equity snapshots.
pub trait TradeLedger: Send + Sync {
    /// All trades of one instance, oldest first.
    fn trades_for_instance(&self, instance_id: i64) -> Result<Vec<LiveTrade>, SigtraderError>;

    fn append_trade(&self, trade: &LiveTrade) -> Result<i64, SigtraderError>;

    fn append_snapshot(&self, snapshot: &AccountEquitySnapshot) -> Result<(), SigtraderError>;
}
