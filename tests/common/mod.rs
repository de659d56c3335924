#![allow(dead_code)]

use btopt::domain::backtest::SymbolResult;
use btopt::domain::bar::Bar;
use btopt::domain::error::BtoptError;
use btopt::domain::fill::Quote;
use btopt::domain::orchestrator::SymbolError;
use btopt::domain::position::OptionContract;
use btopt::domain::series::IndicatorSeries;
use btopt::domain::settings::RunSettings;
use btopt::domain::shard::Shard;
use btopt::domain::strategy::{Leg, LegSide};
use btopt::ports::artifact_port::{ArtifactPort, ArtifactSyncPort};
use btopt::ports::data_port::DataPort;
use btopt::ports::option_chain_port::OptionChainPort;
use btopt::adapters::file_config_adapter::FileConfigAdapter;
use chrono::{NaiveDate, NaiveDateTime};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::PathBuf;

pub fn ts(i: usize) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
        + chrono::Duration::days(i as i64)
}

pub fn make_bar(i: usize, close: f64) -> Bar {
    Bar {
        timestamp: ts(i),
        open: close,
        high: close,
        low: close,
        close,
        volume: 10_000,
    }
}

/// Series with one Buy signal at index 2 (RSI crosses 30, close above EMA).
pub fn buy_series(symbol: &str, closes: &[f64]) -> IndicatorSeries {
    let bars: Vec<Bar> = closes.iter().enumerate().map(|(i, &c)| make_bar(i, c)).collect();
    let n = bars.len();
    let mut rsi = vec![Some(50.0); n];
    rsi[0] = Some(20.0);
    rsi[1] = Some(25.0);
    rsi[2] = Some(35.0);
    IndicatorSeries::from_bars(symbol, bars)
        .with_rsi(rsi)
        .with_ema(vec![Some(1.0); n])
}

pub fn settings_from(ini: &str) -> RunSettings {
    let adapter = FileConfigAdapter::from_string(ini).unwrap();
    RunSettings::from_config(&adapter).unwrap()
}

pub struct MockDataPort {
    pub series: HashMap<String, IndicatorSeries>,
    pub errors: HashMap<String, String>,
    /// Transient failures left before a symbol's fetch succeeds.
    pub transient: RefCell<HashMap<String, u32>>,
    pub calls: RefCell<Vec<String>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            series: HashMap::new(),
            errors: HashMap::new(),
            transient: RefCell::new(HashMap::new()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_series(mut self, series: IndicatorSeries) -> Self {
        self.series.insert(series.symbol.clone(), series);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn with_transient_failures(self, symbol: &str, failures: u32) -> Self {
        self.transient.borrow_mut().insert(symbol.to_string(), failures);
        self
    }

    pub fn call_count(&self, symbol: &str) -> usize {
        self.calls.borrow().iter().filter(|s| *s == symbol).count()
    }
}

impl DataPort for MockDataPort {
    fn fetch_series(
        &self,
        symbol: &str,
        _timeframe: &str,
        _lookback_days: u32,
    ) -> Result<IndicatorSeries, BtoptError> {
        self.calls.borrow_mut().push(symbol.to_string());
        if let Some(left) = self.transient.borrow_mut().get_mut(symbol)
            && *left > 0
        {
            *left -= 1;
            return Err(BtoptError::TransientFetch {
                symbol: symbol.to_string(),
                reason: "timeout".into(),
            });
        }
        if let Some(reason) = self.errors.get(symbol) {
            return Err(BtoptError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        self.series
            .get(symbol)
            .cloned()
            .ok_or_else(|| BtoptError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no history".into(),
            })
    }

    fn list_symbols(&self) -> Result<Vec<String>, BtoptError> {
        let mut symbols: Vec<String> = self.series.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

/// Put-spread friendly chain: short legs 5 below spot, long legs 10 below,
/// premiums decaying linearly from the entry day.
pub struct MockOptionChain {
    pub entry_mid: f64,
    pub decay_per_day: f64,
    pub entry_day: NaiveDate,
}

impl OptionChainPort for MockOptionChain {
    fn select_contract(
        &self,
        underlying: &str,
        leg: &Leg,
        underlying_price: f64,
        _as_of: NaiveDateTime,
    ) -> Result<(OptionContract, Quote), BtoptError> {
        let (offset, mid) = match leg.side {
            LegSide::Short => (5.0, self.entry_mid),
            LegSide::Long => (10.0, self.entry_mid / 2.0),
        };
        Ok((
            OptionContract {
                contract_symbol: format!("{underlying}-{:?}", leg.side),
                underlying: underlying.to_string(),
                option_type: leg.option_type,
                strike: underlying_price - offset,
                expiry: self.entry_day + chrono::Days::new(25),
            },
            Quote {
                mid,
                spread: 0.0,
                open_interest: Some(1_000),
                volume: 500,
            },
        ))
    }

    fn mark(
        &self,
        contract: &OptionContract,
        as_of: NaiveDateTime,
    ) -> Result<Option<Quote>, BtoptError> {
        let days = (as_of.date() - self.entry_day).num_days() as f64;
        let base = if contract.contract_symbol.ends_with("Short") {
            self.entry_mid
        } else {
            self.entry_mid / 2.0
        };
        Ok(Some(Quote {
            mid: (base - self.decay_per_day * days).max(0.01),
            spread: 0.0,
            open_interest: Some(1_000),
            volume: 500,
        }))
    }
}

#[derive(Default)]
pub struct RecordingArtifacts {
    pub trades_written: RefCell<Vec<String>>,
    pub summaries: RefCell<Vec<(String, usize, usize)>>,
    pub fail_symbol: Option<String>,
    pub fail_summary: bool,
}

impl ArtifactPort for RecordingArtifacts {
    fn write_symbol_trades(
        &self,
        result: &SymbolResult,
        timeframe: &str,
    ) -> Result<PathBuf, BtoptError> {
        let path = format!("{}_{}.parquet", result.symbol, timeframe);
        if self.fail_symbol.as_deref() == Some(result.symbol.as_str()) {
            return Err(BtoptError::Artifact {
                path,
                reason: "disk full".into(),
            });
        }
        self.trades_written.borrow_mut().push(result.symbol.clone());
        Ok(PathBuf::from(path))
    }

    fn write_shard_summary(
        &self,
        shard: &Shard,
        results: &[SymbolResult],
        errors: &[SymbolError],
    ) -> Result<Vec<PathBuf>, BtoptError> {
        if self.fail_summary {
            return Err(BtoptError::Artifact {
                path: format!("{}.csv", shard.label()),
                reason: "read-only".into(),
            });
        }
        self.summaries
            .borrow_mut()
            .push((shard.label(), results.len(), errors.len()));
        Ok(vec![PathBuf::from(format!("{}.csv", shard.label()))])
    }
}

/// Records sync calls; must only ever see fully written shards.
pub struct RecordingSync<'a> {
    pub artifacts: &'a RecordingArtifacts,
    pub prefixes: RefCell<Vec<String>>,
    pub summaries_at_sync: Cell<Option<usize>>,
}

impl<'a> RecordingSync<'a> {
    pub fn new(artifacts: &'a RecordingArtifacts) -> Self {
        Self {
            artifacts,
            prefixes: RefCell::new(Vec::new()),
            summaries_at_sync: Cell::new(None),
        }
    }
}

impl ArtifactSyncPort for RecordingSync<'_> {
    fn sync(&self, prefix: &str) -> Result<(), BtoptError> {
        self.summaries_at_sync
            .set(Some(self.artifacts.summaries.borrow().len()));
        self.prefixes.borrow_mut().push(prefix.to_string());
        Ok(())
    }
}
