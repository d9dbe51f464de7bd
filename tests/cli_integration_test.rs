//! CLI integration tests: argument helpers, CSV backtests on disk, instance
//! loading, candle sync paging, and exit codes of `cli::run`.

mod common;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{TimeZone, Utc};
use clap::Parser;
use common::*;
use sigtrader::adapters::csv_adapter;
use sigtrader::adapters::file_config_adapter::FileConfigAdapter;
use sigtrader::cli::{self, Cli};
use sigtrader::domain::error::SigtraderError;
use sigtrader::ports::candle_port::CandleStore;
use sigtrader::ports::config_port::ConfigPort;
use tempfile::TempDir;

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

fn write_strategy(dir: &Path, name: &str) -> PathBuf {
    write_file(dir, name, &candle_rules().to_json().unwrap())
}

fn scenario_bars() -> Vec<Bar> {
    (0..8)
        .map(|i| match i {
            2 => big_yang(i),
            5 => big_yin(i),
            _ => quiet_bar(i, 100.0),
        })
        .collect()
}

fn same_exit(actual: ExitCode, expected: ExitCode) -> bool {
    format!("{actual:?}") == format!("{expected:?}")
}

mod arguments {
    use super::*;

    #[test]
    fn bare_dates_cover_the_whole_day_as_end_bounds() {
        let start = cli::parse_instant("2024-03-01", false).unwrap();
        let end = cli::parse_instant("2024-03-01", true).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(end - start, chrono::Duration::days(1) - chrono::Duration::milliseconds(1));
    }

    #[test]
    fn rfc3339_instants_are_converted_to_utc() {
        let parsed = cli::parse_instant("2024-03-01T10:00:00+02:00", true).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
    }

    #[test]
    fn garbage_dates_are_invalid_input() {
        let err = cli::parse_instant("01/03/2024", false).unwrap_err();
        assert!(matches!(err, SigtraderError::InvalidInput { .. }));
    }

    #[test]
    fn initial_balance_prefers_flag_then_config_then_default() {
        let config = FileConfigAdapter::from_string("[backtest]\ninitial_balance = 5000\n").unwrap();
        let config: &dyn ConfigPort = &config;

        assert_eq!(cli::resolve_initial_balance(Some(250.0), Some(config)), 250.0);
        assert_eq!(cli::resolve_initial_balance(None, Some(config)), 5000.0);
        assert_eq!(cli::resolve_initial_balance(None, None), 1000.0);
    }

    #[test]
    fn csv_and_config_sources_conflict() {
        let parsed = Cli::try_parse_from([
            "sigtrader", "backtest", "--strategy", "s.json", "--csv", "bars.csv", "--config",
            "c.ini",
        ]);
        assert!(parsed.is_err());
    }
}

mod strategies {
    use super::*;

    #[test]
    fn unreadable_strategy_is_a_rule_parse_error() {
        let dir = TempDir::new().unwrap();
        let err = cli::load_rule_set(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, SigtraderError::RuleParse { .. }));
    }

    #[test]
    fn validate_exit_codes() {
        let dir = TempDir::new().unwrap();
        let good = write_strategy(dir.path(), "good.json");
        let bad = write_file(
            dir.path(),
            "bad.json",
            r#"{"buy_groups":[{"logic":"AND","conditions":[{"side":"BUY","indicator_type":"MACD","signal_type":"NOT_A_SIGNAL"}]}],"sell_groups":[]}"#,
        );

        let ok = cli::run(Cli::try_parse_from(["sigtrader", "validate", "-s", good.to_str().unwrap()]).unwrap());
        assert!(same_exit(ok, ExitCode::SUCCESS));

        let rejected =
            cli::run(Cli::try_parse_from(["sigtrader", "validate", "-s", bad.to_str().unwrap()]).unwrap());
        assert!(same_exit(rejected, ExitCode::from(4)));
    }
}

mod csv_backtest {
    use super::*;

    #[test]
    fn writes_result_json() {
        let dir = TempDir::new().unwrap();
        let strategy = write_strategy(dir.path(), "rules.json");
        let bars_path = dir.path().join("bars.csv");
        csv_adapter::write_bars(&bars_path, &scenario_bars()).unwrap();
        let output = dir.path().join("result.json");

        cli::run_backtest_csv(&strategy, &bars_path, None, None, None, Some(&output)).unwrap();

        let result: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(result["trades"].as_array().unwrap().len(), 2);
        assert_eq!(result["trades"][0]["side"], "BUY");
        assert_eq!(result["equity_curve"].as_array().unwrap().len(), 8);
        assert!((result["total_return"].as_f64().unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn window_limits_the_bars() {
        let dir = TempDir::new().unwrap();
        let strategy = write_strategy(dir.path(), "rules.json");
        let bars_path = dir.path().join("bars.csv");
        csv_adapter::write_bars(&bars_path, &scenario_bars()).unwrap();
        let output = dir.path().join("result.json");

        let end = ts(4).to_rfc3339();
        cli::run_backtest_csv(&strategy, &bars_path, None, Some(&end), Some(500.0), Some(&output))
            .unwrap();

        let result: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        // bought at bar 2, window ends before the sell
        assert_eq!(result["trades"].as_array().unwrap().len(), 1);
        assert_eq!(result["equity_curve"].as_array().unwrap().len(), 5);
        assert!((result["trades"][0]["qty"].as_f64().unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn window_without_bars_is_no_data() {
        let dir = TempDir::new().unwrap();
        let strategy = write_strategy(dir.path(), "rules.json");
        let bars_path = dir.path().join("bars.csv");
        csv_adapter::write_bars(&bars_path, &scenario_bars()).unwrap();

        let err = cli::run_backtest_csv(&strategy, &bars_path, Some("2030-01-01"), None, None, None)
            .unwrap_err();
        assert!(matches!(err, SigtraderError::NoData { .. }));
    }

    #[test]
    fn backtest_needs_a_source() {
        let code = cli::run(Cli::try_parse_from(["sigtrader", "backtest", "-s", "rules.json"]).unwrap());
        assert!(same_exit(code, ExitCode::from(7)));
    }
}

mod instances {
    use super::*;

    #[test]
    fn loads_every_instance_section_in_id_order() {
        let dir = TempDir::new().unwrap();
        write_strategy(dir.path(), "rules.json");
        let config = FileConfigAdapter::from_string(
            "[instance.2]\ninst_id = ETH-USDT\ntimeframe = 4H\ninterval_sec = 120\nstrategy = rules.json\n\
             [instance.10]\ninst_id = SOL-USDT\ntimeframe = 1D\ninterval_sec = 300\nstrategy = rules.json\n\
             [instance.1]\ninst_id = BTC-USDT\ntimeframe = 1H\ninterval_sec = 60\nstrategy = rules.json\n\
             [live]\nlookback = 100\n",
        )
        .unwrap();

        let instances = cli::load_instances(&config, dir.path()).unwrap();
        let ids: Vec<i64> = instances.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2, 10]);
        assert_eq!(instances[1].inst_id, "ETH-USDT");
        assert_eq!(instances[1].interval.as_secs(), 120);
        assert_eq!(instances[2].inst_id, "SOL-USDT");
    }

    #[test]
    fn sections_naming_the_same_id_are_rejected() {
        let dir = TempDir::new().unwrap();
        write_strategy(dir.path(), "rules.json");
        let config = FileConfigAdapter::from_string(
            "[instance.01]\ninst_id = ETH-USDT\ntimeframe = 4H\ninterval_sec = 120\nstrategy = rules.json\n\
             [instance.1]\ninst_id = BTC-USDT\ntimeframe = 1H\ninterval_sec = 60\nstrategy = rules.json\n",
        )
        .unwrap();

        let err = cli::load_instances(&config, dir.path()).unwrap_err();
        assert!(matches!(err, SigtraderError::ConfigInvalid { key, .. } if key == "id"));
    }

    #[test]
    fn instance_without_market_is_config_missing() {
        let dir = TempDir::new().unwrap();
        write_strategy(dir.path(), "rules.json");
        let config = FileConfigAdapter::from_string(
            "[instance.1]\ntimeframe = 1H\ninterval_sec = 60\nstrategy = rules.json\n",
        )
        .unwrap();

        let err = cli::load_instances(&config, dir.path()).unwrap_err();
        assert!(matches!(err, SigtraderError::ConfigMissing { key, .. } if key == "inst_id"));
    }
}

mod sync {
    use super::*;

    #[tokio::test]
    async fn pages_backwards_until_an_empty_page() {
        let bars: Vec<Bar> = (0..20).map(|i| quiet_bar(i, 100.0 + i as f64)).collect();
        let gateway = MockGateway::new();
        gateway.push_history_page(&bars[10..]);
        gateway.push_history_page(&bars[..10]);
        let store = MemoryCandleStore::default();

        let stored = cli::sync_candles(&gateway, &store, "BTC-USDT", "1H", 10).await.unwrap();

        assert_eq!(stored, 20);
        let queries = gateway.history_queries.lock().unwrap().clone();
        assert_eq!(
            queries,
            vec![
                (None, None),
                (None, Some(ts(10).timestamp_millis())),
                (None, Some(ts(0).timestamp_millis())),
            ]
        );
        let (first, last, count) = store.data_range("BTC-USDT", "1H").unwrap().unwrap();
        assert_eq!((first, last, count), (ts(0), ts(19), 20));
    }

    #[tokio::test]
    async fn stops_when_the_cursor_does_not_move() {
        let bars: Vec<Bar> = (0..10).map(|i| quiet_bar(i, 100.0)).collect();
        let gateway = MockGateway::new();
        gateway.push_history_page(&bars);
        gateway.push_history_page(&bars);
        gateway.push_history_page(&bars);
        let store = MemoryCandleStore::default();

        let stored = cli::sync_candles(&gateway, &store, "BTC-USDT", "1H", 10).await.unwrap();

        assert_eq!(stored, 10);
        assert_eq!(gateway.history_queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn respects_the_page_limit() {
        let bars: Vec<Bar> = (0..30).map(|i| quiet_bar(i, 100.0)).collect();
        let gateway = MockGateway::new();
        gateway.push_history_page(&bars[20..]);
        gateway.push_history_page(&bars[10..20]);
        gateway.push_history_page(&bars[..10]);
        let store = MemoryCandleStore::default();

        let stored = cli::sync_candles(&gateway, &store, "BTC-USDT", "1H", 2).await.unwrap();
        assert_eq!(stored, 20);
    }
}
