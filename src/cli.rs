//! CLI definition and dispatch.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::okx::{OkxCredentials, OkxGateway};
use crate::domain::backtest::{self as backtest_engine, BacktestResult, DEFAULT_INITIAL_BALANCE};
use crate::domain::config_validation::{
    instance_sections, validate_backtest_config, validate_exchange_config, validate_instance_ids,
    validate_live_config,
};
use crate::domain::error::SigtraderError;
use crate::domain::metrics::Metrics;
use crate::domain::rule_set::RuleSet;
use crate::live::{CycleConfig, CycleContext, InstanceRegistry, TradingInstance};
use crate::ports::candle_port::CandleStore;
use crate::ports::config_port::ConfigPort;
use crate::ports::exchange_port::{bars_from_rows, CandleQuery, ExchangeGateway};

/// Largest page the history endpoint serves.
pub const SYNC_PAGE_LIMIT: usize = 100;

#[derive(Parser, Debug)]
#[command(name = "sigtrader", about = "Indicator signal backtester and live trader")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over a CSV file or stored klines
    Backtest {
        /// Strategy rule set (JSON)
        #[arg(short, long)]
        strategy: PathBuf,
        /// Bar file with ts,open,high,low,close,volume columns
        #[arg(long, conflicts_with = "config")]
        csv: Option<PathBuf>,
        /// INI config; selects stored klines and records the run
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long, requires = "config")]
        inst_id: Option<String>,
        #[arg(long, requires = "config")]
        timeframe: Option<String>,
        /// YYYY-MM-DD or RFC 3339
        #[arg(long)]
        start: Option<String>,
        /// YYYY-MM-DD (inclusive) or RFC 3339
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        initial_balance: Option<f64>,
        /// Where to write the result JSON; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a strategy rule set
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// Download history candles into SQLite
    Sync {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        inst_id: String,
        #[arg(long)]
        timeframe: String,
        /// Number of pages of up to 100 candles to fetch
        #[arg(long, default_value_t = 10)]
        pages: usize,
    },
    /// Run the configured live instances until Ctrl-C
    Live {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print the trade summary of a live instance
    Summary {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        instance_id: i64,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            strategy,
            csv,
            config,
            inst_id,
            timeframe,
            start,
            end,
            initial_balance,
            output,
        } => match (csv, config) {
            (Some(csv), _) => run_backtest_csv(
                &strategy,
                &csv,
                start.as_deref(),
                end.as_deref(),
                initial_balance,
                output.as_deref(),
            ),
            (None, Some(config)) => run_backtest_stored(
                &strategy,
                &config,
                inst_id.as_deref(),
                timeframe.as_deref(),
                start.as_deref(),
                end.as_deref(),
                initial_balance,
                output.as_deref(),
            ),
            (None, None) => Err(SigtraderError::InvalidInput {
                reason: "backtest needs either --csv or --config".into(),
            }),
        },
        Command::Validate { strategy } => run_validate(&strategy),
        Command::Sync {
            config,
            inst_id,
            timeframe,
            pages,
        } => run_sync(&config, &inst_id, &timeframe, pages),
        Command::Live { config } => run_live(&config),
        Command::Summary {
            config,
            instance_id,
        } => run_summary(&config, instance_id),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SigtraderError> {
    FileConfigAdapter::from_file(path).map_err(|e| SigtraderError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

pub fn load_rule_set(path: &Path) -> Result<RuleSet, SigtraderError> {
    let json = fs::read_to_string(path).map_err(|e| SigtraderError::RuleParse {
        reason: format!("cannot read {}: {}", path.display(), e),
    })?;
    RuleSet::from_json(&json)
}

/// Parse `YYYY-MM-DD` or RFC 3339. A bare date used as an end bound covers
/// the whole day.
pub fn parse_instant(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, SigtraderError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        SigtraderError::InvalidInput {
            reason: format!("invalid date '{raw}' (expected YYYY-MM-DD or RFC 3339)"),
        }
    })?;
    let start = date.and_time(NaiveTime::MIN).and_utc();
    Ok(if end_of_day {
        start + ChronoDuration::days(1) - ChronoDuration::milliseconds(1)
    } else {
        start
    })
}

/// CLI override, then `[backtest] initial_balance`, then the default.
pub fn resolve_initial_balance(cli_value: Option<f64>, config: Option<&dyn ConfigPort>) -> f64 {
    cli_value.unwrap_or_else(|| {
        config.map_or(DEFAULT_INITIAL_BALANCE, |c| {
            c.get_double("backtest", "initial_balance", DEFAULT_INITIAL_BALANCE)
        })
    })
}

fn print_metrics(metrics: &Metrics, trade_count: usize) {
    eprintln!("\n=== Backtest Results ===");
    eprintln!("Total Return:     {:.2}%", metrics.total_return);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Max Drawdown:     {:.2}%", metrics.max_drawdown);
    eprintln!("Profit Factor:    {:.2}", metrics.profit_factor);
    eprintln!("Total Trades:     {}", trade_count);
}

fn write_result(result: &BacktestResult, output: Option<&Path>) -> Result<(), SigtraderError> {
    let json = serde_json::to_string_pretty(result).map_err(|e| SigtraderError::Simulation {
        reason: format!("failed to serialise result: {e}"),
    })?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            eprintln!("\nResult written to: {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub fn run_backtest_csv(
    strategy_path: &Path,
    csv_path: &Path,
    start: Option<&str>,
    end: Option<&str>,
    initial_balance: Option<f64>,
    output: Option<&Path>,
) -> Result<(), SigtraderError> {
    // Stage 1: Load strategy
    eprintln!("Loading strategy from {}", strategy_path.display());
    let rule_set = load_rule_set(strategy_path)?;

    // Stage 2: Load bars, optionally windowed
    eprintln!("Loading bars from {}", csv_path.display());
    let start = start.map(|s| parse_instant(s, false)).transpose()?;
    let end = end.map(|s| parse_instant(s, true)).transpose()?;
    let bars: Vec<_> = csv_adapter::read_bars(csv_path)?
        .into_iter()
        .filter(|b| start.is_none_or(|s| b.ts >= s) && end.is_none_or(|e| b.ts <= e))
        .collect();

    // Stage 3: Simulate
    let balance = resolve_initial_balance(initial_balance, None);
    eprintln!("Running backtest: {} bars, initial balance {:.2}", bars.len(), balance);
    let result = backtest_engine::run_backtest(&bars, &rule_set, balance)?;

    // Stage 4: Report
    print_metrics(&result.metrics, result.trades.len());
    write_result(&result, output)
}

#[cfg(feature = "sqlite")]
fn open_store(config: &dyn ConfigPort) -> Result<crate::adapters::sqlite_adapter::SqliteAdapter, SigtraderError> {
    let store = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?;
    store.initialize_schema()?;
    Ok(store)
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_required(command: &str) -> SigtraderError {
    SigtraderError::Database {
        reason: format!("the sqlite feature is required for {command}"),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_backtest_stored(
    strategy_path: &Path,
    config_path: &Path,
    inst_id: Option<&str>,
    timeframe: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
    initial_balance: Option<f64>,
    output: Option<&Path>,
) -> Result<(), SigtraderError> {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;

    let required = |value: Option<&str>, flag: &str| {
        value.map(str::to_string).ok_or_else(|| SigtraderError::InvalidInput {
            reason: format!("--{flag} is required with --config"),
        })
    };
    let inst_id = required(inst_id, "inst-id")?;
    let timeframe = required(timeframe, "timeframe")?;
    let start = parse_instant(&required(start, "start")?, false)?;
    let end = parse_instant(&required(end, "end")?, true)?;

    // Stage 2: Load strategy
    eprintln!("Loading strategy from {}", strategy_path.display());
    let rule_set = load_rule_set(strategy_path)?;

    let request = crate::domain::backtest_job::BacktestRequest {
        inst_id,
        timeframe,
        start,
        end,
        initial_balance: resolve_initial_balance(initial_balance, Some(&config as &dyn ConfigPort)),
        rule_set,
    };

    // Stage 3: Run against stored klines
    #[cfg(feature = "sqlite")]
    {
        let store = open_store(&config)?;
        eprintln!(
            "Running backtest: {} {} from {} to {}",
            request.inst_id, request.timeframe, request.start, request.end
        );
        let completed = crate::domain::backtest_job::run_backtest_job(&store, &store, &request)?;
        eprintln!("Backtest run {} finished", completed.run_id);
        print_metrics(&completed.result.metrics, completed.result.trades.len());
        write_result(&completed.result, output)
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (request, output);
        Err(sqlite_required("stored backtests"))
    }
}

fn run_validate(strategy_path: &Path) -> Result<(), SigtraderError> {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let rule_set = load_rule_set(strategy_path)?;

    eprintln!(
        "  buy groups: {}, sell groups: {}, conditions: {}",
        rule_set.buy_groups.len(),
        rule_set.sell_groups.len(),
        rule_set.condition_count()
    );
    for (side, condition, reason) in rule_set.inert_conditions() {
        eprintln!(
            "  warning: {} group condition {} {}: {}",
            side, condition.side, condition.signal_type, reason
        );
    }
    eprintln!("\nStrategy is valid");
    Ok(())
}

/// Page backwards through history candles, storing each page.
///
/// Stops after `pages` pages or at the first empty page. Returns the number
/// of bars newly stored.
pub async fn sync_candles(
    gateway: &dyn ExchangeGateway,
    store: &dyn CandleStore,
    inst_id: &str,
    timeframe: &str,
    pages: usize,
) -> Result<usize, SigtraderError> {
    let mut cursor: Option<i64> = None;
    let mut stored = 0;

    for page in 0..pages {
        let query = CandleQuery {
            after: cursor,
            ..CandleQuery::latest(inst_id, timeframe, SYNC_PAGE_LIMIT)
        };
        let rows = gateway.get_history_candles(&query).await?;
        let Some(oldest) = rows.iter().map(|r| r.ts_ms).min() else {
            break;
        };
        if cursor.is_some_and(|c| oldest >= c) {
            // cursor did not move; the exchange has nothing older
            break;
        }
        let inserted = store.store_bars(inst_id, timeframe, &bars_from_rows(&rows))?;
        tracing::info!(page, rows = rows.len(), inserted, inst_id, "history page stored");
        stored += inserted;
        cursor = Some(oldest);
    }
    Ok(stored)
}

fn current_thread_runtime() -> Result<tokio::runtime::Runtime, SigtraderError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(SigtraderError::from)
}

fn run_sync(
    config_path: &Path,
    inst_id: &str,
    timeframe: &str,
    pages: usize,
) -> Result<(), SigtraderError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    validate_exchange_config(&config)?;

    // market data is public; sign only when credentials are available
    let gateway = OkxGateway::from_config(&config, OkxCredentials::from_env().ok())?;

    #[cfg(feature = "sqlite")]
    {
        let store = open_store(&config)?;
        let runtime = current_thread_runtime()?;
        let stored = runtime.block_on(sync_candles(&gateway, &store, inst_id, timeframe, pages))?;
        eprintln!("Stored {stored} new candles for {inst_id} {timeframe}");
        if let Some((first, last, count)) = store.data_range(inst_id, timeframe)? {
            eprintln!("  {count} candles from {first} to {last}");
        }
        Ok(())
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (gateway, inst_id, timeframe, pages, current_thread_runtime);
        Err(sqlite_required("sync"))
    }
}

/// Every `[instance.<id>]` section as a trading instance. Strategy paths are
/// relative to `base_dir`.
pub fn load_instances(
    config: &dyn ConfigPort,
    base_dir: &Path,
) -> Result<Vec<TradingInstance>, SigtraderError> {
    validate_instance_ids(config)?;
    instance_sections(config)
        .iter()
        .map(|section| TradingInstance::from_config_section(config, section, base_dir))
        .collect()
}

fn run_live(config_path: &Path) -> Result<(), SigtraderError> {
    // Stage 1: Config, credentials, instances; fail before anything runs
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    validate_live_config(&config)?;
    let credentials = OkxCredentials::from_env()?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let instances = load_instances(&config, base_dir)?;
    if instances.is_empty() {
        return Err(SigtraderError::ConfigMissing {
            section: "instance.<id>".into(),
            key: "inst_id".into(),
        });
    }

    #[cfg(feature = "sqlite")]
    {
        let store = Arc::new(open_store(&config)?);
        let gateway = Arc::new(OkxGateway::from_config(&config, Some(credentials))?);
        let ctx = Arc::new(CycleContext {
            gateway,
            ledger: store,
            config: CycleConfig::from_config(&config),
        });

        // Stage 2: Schedule and run until Ctrl-C
        let runtime = current_thread_runtime()?;
        runtime.block_on(async {
            let registry = InstanceRegistry::new(ctx);
            for instance in instances {
                eprintln!(
                    "Starting instance {}: {} {} every {}s",
                    instance.id,
                    instance.inst_id,
                    instance.timeframe,
                    instance.interval.as_secs()
                );
                registry.register(instance)?;
            }
            tokio::signal::ctrl_c().await?;
            eprintln!("\nShutting down...");
            registry.shutdown().await;
            Ok::<(), SigtraderError>(())
        })
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (credentials, instances);
        Err(sqlite_required("live"))
    }
}

fn run_summary(config_path: &Path, instance_id: i64) -> Result<(), SigtraderError> {
    let config = load_config(config_path)?;

    #[cfg(feature = "sqlite")]
    {
        use crate::ports::ledger_port::TradeLedger;

        let store = open_store(&config)?;
        let trades = store.trades_for_instance(instance_id)?;
        let summary = crate::domain::ledger::summarize(instance_id, &trades);
        eprintln!(
            "Instance {}: {} trades ({} buy, {} sell), position {}",
            summary.instance_id,
            summary.total_trades,
            summary.buy_count,
            summary.sell_count,
            summary.current_position
        );
        let json = serde_json::to_string_pretty(&summary).map_err(|e| SigtraderError::InvalidInput {
            reason: format!("failed to serialise summary: {e}"),
        })?;
        println!("{json}");
        Ok(())
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (config, instance_id);
        Err(sqlite_required("summary"))
    }
}
