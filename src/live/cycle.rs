//! One polling cycle of a live trading instance.
//!
//! fetch recent bars -> indicators -> last-bar signals -> ledger position ->
//! at most one market order -> equity snapshot.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::config_validation::{instance_id, validate_instance_section};
use crate::domain::error::SigtraderError;
use crate::domain::indicator::EnrichedFrame;
use crate::domain::ledger::{
    decide_order, net_position, AccountEquitySnapshot, LiveTrade, OrderIntent, STATUS_SENT,
};
use crate::domain::rule_set::RuleSet;
use crate::ports::config_port::ConfigPort;
use crate::ports::exchange_port::{
    bars_from_rows, CandleQuery, ExchangeGateway, OrderReceipt, OrderType,
};
use crate::ports::ledger_port::TradeLedger;

pub const DEFAULT_LOOKBACK: usize = 200;
pub const DEFAULT_ORDER_SIZE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleConfig {
    /// Number of most recent bars fetched per cycle.
    pub lookback: usize,
    /// Quantity of each BUY order.
    pub order_size: f64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            lookback: DEFAULT_LOOKBACK,
            order_size: DEFAULT_ORDER_SIZE,
        }
    }
}

impl CycleConfig {
    /// Reads `[live] lookback, order_size`; run `validate_live_config` first.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        Self {
            lookback: config
                .get_int("live", "lookback", DEFAULT_LOOKBACK as i64)
                .max(1) as usize,
            order_size: config.get_double("live", "order_size", DEFAULT_ORDER_SIZE),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradingInstance {
    pub id: i64,
    pub inst_id: String,
    pub timeframe: String,
    pub interval: Duration,
    pub rule_set: RuleSet,
}

impl TradingInstance {
    /// Build from an `[instance.<id>]` section. The `strategy` path is
    /// resolved against `base_dir` when relative.
    pub fn from_config_section(
        config: &dyn ConfigPort,
        section: &str,
        base_dir: &Path,
    ) -> Result<Self, SigtraderError> {
        validate_instance_section(config, section)?;
        let id = instance_id(section)?;
        let get = |key: &str| {
            config
                .get_string(section, key)
                .ok_or_else(|| SigtraderError::ConfigMissing {
                    section: section.to_string(),
                    key: key.to_string(),
                })
        };

        let strategy_path = base_dir.join(get("strategy")?);
        let json = std::fs::read_to_string(&strategy_path).map_err(|e| {
            SigtraderError::ConfigInvalid {
                section: section.to_string(),
                key: "strategy".to_string(),
                reason: format!("cannot read {}: {}", strategy_path.display(), e),
            }
        })?;

        Ok(Self {
            id,
            inst_id: get("inst_id")?,
            timeframe: get("timeframe")?,
            interval: Duration::from_secs(config.get_int(section, "interval_sec", 60).max(1) as u64),
            rule_set: RuleSet::from_json(&json)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The exchange returned no bars; nothing was touched.
    NoData,
    /// Signals evaluated, no order warranted.
    Idle,
    OrderSent(OrderIntent),
    /// The previous cycle of this instance was still running.
    Skipped,
}

/// Shared collaborators of every cycle.
pub struct CycleContext {
    pub gateway: Arc<dyn ExchangeGateway>,
    pub ledger: Arc<dyn TradeLedger>,
    pub config: CycleConfig,
}

/// Run one cycle for `instance`.
///
/// An equity snapshot follows every cycle that sends an order or decides
/// not to. A rejected order returns its error with nothing persisted. A
/// failed trade write is returned after the snapshot, and a failed snapshot
/// only logs.
pub async fn run_cycle(
    ctx: &CycleContext,
    instance: &TradingInstance,
) -> Result<CycleOutcome, SigtraderError> {
    let query = CandleQuery::latest(&instance.inst_id, &instance.timeframe, ctx.config.lookback);
    let rows = ctx.gateway.get_candles(&query).await?;
    let frame = EnrichedFrame::compute(bars_from_rows(&rows));
    let (Some(last), Some(price)) = (
        frame.last_index(),
        frame.bars().last().map(|b| b.close),
    ) else {
        debug!(instance_id = instance.id, inst_id = %instance.inst_id, "no candles returned");
        return Ok(CycleOutcome::NoData);
    };

    let buy = instance.rule_set.should_buy(&frame, last);
    let sell = instance.rule_set.should_sell(&frame, last);
    let net = net_position(&ctx.ledger.trades_for_instance(instance.id)?);
    debug!(instance_id = instance.id, buy, sell, net, "signals evaluated");

    let Some(intent) = decide_order(buy, sell, net, ctx.config.order_size) else {
        record_snapshot(ctx, instance.id).await;
        return Ok(CycleOutcome::Idle);
    };

    // a rejected order ends the cycle before anything is written
    let receipt = ctx
        .gateway
        .place_order(&instance.inst_id, intent.side, intent.size, OrderType::Market)
        .await?;
    let recorded = record_trade(ctx, instance, intent, price, receipt);
    record_snapshot(ctx, instance.id).await;
    recorded.map(|()| CycleOutcome::OrderSent(intent))
}

fn record_trade(
    ctx: &CycleContext,
    instance: &TradingInstance,
    intent: OrderIntent,
    price: f64,
    receipt: OrderReceipt,
) -> Result<(), SigtraderError> {
    let trade = LiveTrade {
        instance_id: instance.id,
        side: intent.side,
        ts: Utc::now(),
        price,
        qty: intent.size,
        order_id: receipt.order_id.clone(),
        status: STATUS_SENT.to_string(),
        pnl: None,
        raw_response: Some(receipt.raw),
    };
    ctx.ledger.append_trade(&trade)?;
    info!(
        instance_id = instance.id,
        inst_id = %instance.inst_id,
        side = %intent.side,
        size = intent.size,
        price,
        order_id = receipt.order_id.as_deref().unwrap_or("-"),
        "order sent"
    );
    Ok(())
}

async fn record_snapshot(ctx: &CycleContext, instance_id: i64) {
    let overview = match ctx.gateway.get_account_overview().await {
        Ok(overview) => overview,
        Err(e) => {
            warn!(instance_id, error = %e, "balance query failed");
            return;
        }
    };
    let Some(equity) = overview.total_eq else {
        debug!(instance_id, "balance response had no totalEq");
        return;
    };
    let snapshot = AccountEquitySnapshot {
        ts: Utc::now(),
        equity,
    };
    if let Err(e) = ctx.ledger.append_snapshot(&snapshot) {
        warn!(instance_id, error = %e, "failed to store equity snapshot");
    }
}
