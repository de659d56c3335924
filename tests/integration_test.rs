//! Shard-level tests for the backtest orchestrator.
//!
//! Tests cover:
//! - Equity sweeps producing one run per grid point
//! - Per-symbol failures (data, artifacts) recorded without aborting the shard
//! - Retry of transient fetch failures
//! - Dry runs, summary writing, and sync ordering
//! - Configuration errors that abort the shard up front

mod common;

use btopt::domain::backtest::ParamSet;
use btopt::domain::error::BtoptError;
use btopt::domain::orchestrator::BacktestOrchestrator;
use btopt::domain::position::PositionKind;
use btopt::domain::retry::RetryPolicy;
use btopt::domain::settings::RunSettings;
use common::*;

const EQUITY_INI: &str = r#"
[universe]
symbols = AAA,BBB,CCC

[sweep]
take_profit_grid = 0.01,0.02
stop_loss_grid = 0.01
max_bars_grid = 5
min_trades = 1
"#;

const OPTIONS_INI: &str = r#"
[universe]
symbols = SPY

[execution]
mode = options
fee_per_contract = 0

[options]
template = vertical_credit_bull_put
profit_target_pct = 0.5
max_loss_mult_credit = 2.0
time_stop_days = 5
"#;

fn universe(settings: &RunSettings) -> Vec<String> {
    settings.universe.symbols.clone()
}

fn rising(symbol: &str) -> btopt::domain::series::IndicatorSeries {
    buy_series(symbol, &[100.0, 100.0, 100.0, 100.5, 101.5, 102.0, 102.5])
}

mod equity_shards {
    use super::*;

    #[test]
    fn one_run_per_grid_point() {
        let settings = settings_from(EQUITY_INI);
        let data = MockDataPort::new()
            .with_series(rising("AAA"))
            .with_series(rising("BBB"))
            .with_series(rising("CCC"));
        let artifacts = RecordingArtifacts::default();

        let result = BacktestOrchestrator::new(&settings, &data, &artifacts)
            .with_retry_policy(RetryPolicy::immediate(3))
            .run_shard(&universe(&settings))
            .unwrap();

        assert_eq!(result.completed.len(), 3);
        assert!(result.errors.is_empty());
        for symbol in &result.completed {
            assert_eq!(symbol.runs.len(), 2);
            assert_eq!(symbol.strategy, "equity");
            assert!(matches!(symbol.runs[0].params, ParamSet::Equity(_)));
        }
        // one entry at index 2, closed by the 1% target a bar later
        assert!(result.trade_count() >= 3);
        assert_eq!(*artifacts.trades_written.borrow(), vec!["AAA", "BBB", "CCC"]);
        assert_eq!(
            *artifacts.summaries.borrow(),
            vec![("shard_0_of_1".to_string(), 3, 0)]
        );
        // three trade files plus the summary
        assert_eq!(result.artifacts.len(), 4);
    }

    #[test]
    fn failing_symbol_does_not_abort_shard() {
        let settings = settings_from(EQUITY_INI);
        let data = MockDataPort::new()
            .with_series(rising("AAA"))
            .with_error("BBB", "delisted")
            .with_series(rising("CCC"));
        let artifacts = RecordingArtifacts::default();

        let result = BacktestOrchestrator::new(&settings, &data, &artifacts)
            .with_retry_policy(RetryPolicy::immediate(3))
            .run_shard(&universe(&settings))
            .unwrap();

        let done: Vec<&str> = result.completed.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(done, vec!["AAA", "CCC"]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].symbol, "BBB");
        assert!(matches!(
            result.errors[0].error,
            BtoptError::DataUnavailable { .. }
        ));
        // permanent errors are not retried
        assert_eq!(data.call_count("BBB"), 1);
        assert_eq!(artifacts.summaries.borrow()[0], ("shard_0_of_1".to_string(), 2, 1));
    }

    #[test]
    fn invalid_series_is_symbol_error() {
        let settings = settings_from(EQUITY_INI);
        let broken = buy_series("BBB", &[100.0, 0.0, 100.0, 101.0]);
        let data = MockDataPort::new()
            .with_series(rising("AAA"))
            .with_series(broken)
            .with_series(rising("CCC"));
        let artifacts = RecordingArtifacts::default();

        let result = BacktestOrchestrator::new(&settings, &data, &artifacts)
            .run_shard(&universe(&settings))
            .unwrap();
        assert_eq!(result.completed.len(), 2);
        assert_eq!(result.errors[0].symbol, "BBB");
    }

    #[test]
    fn artifact_failure_is_symbol_error() {
        let settings = settings_from(EQUITY_INI);
        let data = MockDataPort::new()
            .with_series(rising("AAA"))
            .with_series(rising("BBB"))
            .with_series(rising("CCC"));
        let artifacts = RecordingArtifacts {
            fail_symbol: Some("BBB".into()),
            ..Default::default()
        };

        let result = BacktestOrchestrator::new(&settings, &data, &artifacts)
            .run_shard(&universe(&settings))
            .unwrap();
        assert_eq!(result.completed.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert!(matches!(result.errors[0].error, BtoptError::Artifact { .. }));
    }

    #[test]
    fn summary_failure_is_fatal() {
        let settings = settings_from(EQUITY_INI);
        let data = MockDataPort::new().with_series(rising("AAA"));
        let artifacts = RecordingArtifacts {
            fail_summary: true,
            ..Default::default()
        };

        let err = BacktestOrchestrator::new(&settings, &data, &artifacts)
            .run_shard(&["AAA".to_string()])
            .unwrap_err();
        assert!(matches!(err, BtoptError::Artifact { .. }));
    }

    #[test]
    fn runs_only_the_assigned_shard() {
        let mut settings = settings_from(EQUITY_INI);
        settings.shard_index = 1;
        settings.shard_count = 2;
        let data = MockDataPort::new()
            .with_series(rising("AAA"))
            .with_series(rising("BBB"))
            .with_series(rising("CCC"));
        let artifacts = RecordingArtifacts::default();

        let result = BacktestOrchestrator::new(&settings, &data, &artifacts)
            .run_shard(&universe(&settings))
            .unwrap();
        // 3 symbols over 2 shards: shard 0 takes AAA,BBB
        assert_eq!(result.shard.symbols, vec!["CCC"]);
        assert_eq!(data.call_count("AAA"), 0);
        assert_eq!(data.call_count("CCC"), 1);
    }
}

mod retries {
    use super::*;

    #[test]
    fn transient_failures_are_retried() {
        let settings = settings_from(EQUITY_INI);
        let data = MockDataPort::new()
            .with_series(rising("AAA"))
            .with_transient_failures("AAA", 2);
        let artifacts = RecordingArtifacts::default();

        let result = BacktestOrchestrator::new(&settings, &data, &artifacts)
            .with_retry_policy(RetryPolicy::immediate(3))
            .run_shard(&["AAA".to_string()])
            .unwrap();
        assert_eq!(data.call_count("AAA"), 3);
        assert_eq!(result.completed.len(), 1);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let settings = settings_from(EQUITY_INI);
        let data = MockDataPort::new()
            .with_series(rising("AAA"))
            .with_transient_failures("AAA", 10);
        let artifacts = RecordingArtifacts::default();

        let result = BacktestOrchestrator::new(&settings, &data, &artifacts)
            .with_retry_policy(RetryPolicy::immediate(3))
            .run_shard(&["AAA".to_string()])
            .unwrap();
        assert_eq!(data.call_count("AAA"), 3);
        assert!(result.completed.is_empty());
        let err = &result.errors[0].error;
        assert!(matches!(err, BtoptError::DataUnavailable { .. }));
        assert!(err.to_string().contains("gave up after 3 attempts"));
    }
}

mod dry_run_and_sync {
    use super::*;

    #[test]
    fn dry_run_fetches_and_writes_nothing() {
        let mut settings = settings_from(EQUITY_INI);
        settings.dry_run = true;
        let data = MockDataPort::new().with_series(rising("AAA"));
        let artifacts = RecordingArtifacts::default();
        let sync = RecordingSync::new(&artifacts);

        let result = BacktestOrchestrator::new(&settings, &data, &artifacts)
            .with_sync(&sync)
            .run_shard(&universe(&settings))
            .unwrap();

        assert!(result.dry_run);
        assert_eq!(result.shard.symbols, vec!["AAA", "BBB", "CCC"]);
        assert!(data.calls.borrow().is_empty());
        assert!(artifacts.trades_written.borrow().is_empty());
        assert!(artifacts.summaries.borrow().is_empty());
        assert!(sync.prefixes.borrow().is_empty());
    }

    #[test]
    fn syncs_once_after_summary() {
        let ini = format!(
            "{EQUITY_INI}\n[output]\nsync = true\nbucket = results\nresults_prefix = runs/today\n"
        );
        let settings = settings_from(&ini);
        let data = MockDataPort::new()
            .with_series(rising("AAA"))
            .with_series(rising("BBB"))
            .with_series(rising("CCC"));
        let artifacts = RecordingArtifacts::default();
        let sync = RecordingSync::new(&artifacts);

        BacktestOrchestrator::new(&settings, &data, &artifacts)
            .with_sync(&sync)
            .run_shard(&universe(&settings))
            .unwrap();

        assert_eq!(*sync.prefixes.borrow(), vec!["runs/today"]);
        assert_eq!(sync.summaries_at_sync.get(), Some(1));
    }

    #[test]
    fn sync_disabled_skips_upload() {
        let settings = settings_from(EQUITY_INI);
        let data = MockDataPort::new().with_series(rising("AAA"));
        let artifacts = RecordingArtifacts::default();
        let sync = RecordingSync::new(&artifacts);

        BacktestOrchestrator::new(&settings, &data, &artifacts)
            .with_sync(&sync)
            .run_shard(&["AAA".to_string()])
            .unwrap();
        assert!(sync.prefixes.borrow().is_empty());
    }

    #[test]
    fn sync_enabled_without_port_is_config_error() {
        let ini = format!("{EQUITY_INI}\n[output]\nsync = true\nbucket = results\n");
        let settings = settings_from(&ini);
        let data = MockDataPort::new();
        let artifacts = RecordingArtifacts::default();

        let err = BacktestOrchestrator::new(&settings, &data, &artifacts)
            .run_shard(&universe(&settings))
            .unwrap_err();
        assert!(matches!(err, BtoptError::ConfigMissing { .. }));
        assert!(data.calls.borrow().is_empty());
    }
}

mod configuration_errors {
    use super::*;

    #[test]
    fn shard_index_out_of_range_is_fatal() {
        let mut settings = settings_from(EQUITY_INI);
        settings.shard_index = 4;
        settings.shard_count = 2;
        let data = MockDataPort::new();
        let artifacts = RecordingArtifacts::default();

        let err = BacktestOrchestrator::new(&settings, &data, &artifacts)
            .run_shard(&universe(&settings))
            .unwrap_err();
        assert!(matches!(err, BtoptError::Shard(_)));
    }

    #[test]
    fn options_mode_without_chain_is_config_error() {
        let settings = settings_from(OPTIONS_INI);
        let data = MockDataPort::new();
        let artifacts = RecordingArtifacts::default();

        let err = BacktestOrchestrator::new(&settings, &data, &artifacts)
            .run_shard(&universe(&settings))
            .unwrap_err();
        match err {
            BtoptError::ConfigMissing { section, key } => {
                assert_eq!(section, "options");
                assert_eq!(key, "option_chain");
            }
            other => panic!("expected ConfigMissing, got {other:?}"),
        }
    }
}

mod options_shards {
    use super::*;

    #[test]
    fn credit_spread_runs_through_shard() {
        let settings = settings_from(OPTIONS_INI);
        let series = buy_series("SPY", &[100.0; 10]);
        let entry_day = series.bars[2].timestamp.date();
        let data = MockDataPort::new().with_series(series);
        let chain = MockOptionChain {
            entry_mid: 2.0,
            decay_per_day: 0.25,
            entry_day,
        };
        let artifacts = RecordingArtifacts::default();

        let result = BacktestOrchestrator::new(&settings, &data, &artifacts)
            .with_option_chain(&chain)
            .run_shard(&universe(&settings))
            .unwrap();

        assert_eq!(result.completed.len(), 1);
        let spy = &result.completed[0];
        assert_eq!(spy.strategy, "vertical_credit_bull_put");
        assert_eq!(spy.runs.len(), 1);
        assert!(matches!(spy.runs[0].params, ParamSet::Options(_)));

        let trade = &spy.runs[0].trades[0];
        assert!(trade.position.is_credit());
        match &trade.position.kind {
            PositionKind::Options { legs, .. } => assert_eq!(legs.len(), 2),
            other => panic!("expected options position, got {other:?}"),
        }
    }
}
