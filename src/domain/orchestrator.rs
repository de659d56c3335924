//! Shard execution: plan, fetch, simulate, persist, then sync once.
//!
//! Symbols run sequentially. A symbol whose data or artifact write fails is
//! recorded in `ShardResult::errors` and the shard moves on. The summary is
//! written and synced only after every symbol has been processed.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::domain::backtest::{run_symbol_options, run_symbol_sweep, Simulator, SymbolResult};
use crate::domain::error::BtoptError;
use crate::domain::retry::{retry_with_backoff, RetryPolicy};
use crate::domain::settings::RunSettings;
use crate::domain::shard::{plan_shard, Shard};
use crate::ports::artifact_port::{ArtifactPort, ArtifactSyncPort};
use crate::ports::data_port::DataPort;
use crate::ports::option_chain_port::OptionChainPort;

#[derive(Debug)]
pub struct SymbolError {
    pub symbol: String,
    pub error: BtoptError,
}

#[derive(Debug)]
pub struct ShardResult {
    pub shard: Shard,
    pub completed: Vec<SymbolResult>,
    pub errors: Vec<SymbolError>,
    pub artifacts: Vec<PathBuf>,
    pub dry_run: bool,
}

impl ShardResult {
    pub fn trade_count(&self) -> usize {
        self.completed.iter().map(SymbolResult::trade_count).sum()
    }
}

pub struct BacktestOrchestrator<'a> {
    settings: &'a RunSettings,
    data: &'a dyn DataPort,
    artifacts: &'a dyn ArtifactPort,
    chain: Option<&'a dyn OptionChainPort>,
    sync: Option<&'a dyn ArtifactSyncPort>,
    retry: RetryPolicy,
}

impl<'a> BacktestOrchestrator<'a> {
    pub fn new(
        settings: &'a RunSettings,
        data: &'a dyn DataPort,
        artifacts: &'a dyn ArtifactPort,
    ) -> Self {
        BacktestOrchestrator {
            settings,
            data,
            artifacts,
            chain: None,
            sync: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_option_chain(mut self, chain: &'a dyn OptionChainPort) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn with_sync(mut self, sync: &'a dyn ArtifactSyncPort) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run this process's shard of `universe`.
    pub fn run_shard(&self, universe: &[String]) -> Result<ShardResult, BtoptError> {
        let settings = self.settings;
        let shard = plan_shard(universe, settings.shard_index, settings.shard_count)?;

        if settings.options.is_some() && self.chain.is_none() {
            return Err(BtoptError::missing("options", "option_chain"));
        }
        if settings.output.sync && self.sync.is_none() {
            return Err(BtoptError::missing("output", "bucket"));
        }

        info!(
            shard = %shard.label(),
            symbols = shard.len(),
            universe = universe.len(),
            "planned shard"
        );

        if settings.dry_run {
            info!(symbols = ?shard.symbols, "dry run, nothing executed");
            return Ok(ShardResult {
                shard,
                completed: Vec::new(),
                errors: Vec::new(),
                artifacts: Vec::new(),
                dry_run: true,
            });
        }

        let simulator = Simulator::new(&settings.execution, &settings.data.timeframe);
        let mut completed = Vec::with_capacity(shard.len());
        let mut errors = Vec::new();
        let mut artifacts = Vec::new();

        for (n, symbol) in shard.symbols.iter().enumerate() {
            match self.run_symbol(&simulator, symbol) {
                Ok(result) => match self
                    .artifacts
                    .write_symbol_trades(&result, &settings.data.timeframe)
                {
                    Ok(path) => {
                        info!(
                            symbol = %symbol,
                            runs = result.runs.len(),
                            valid = result.valid_runs(),
                            trades = result.trade_count(),
                            "symbol complete"
                        );
                        artifacts.push(path);
                        completed.push(result);
                    }
                    Err(error) => {
                        warn!(symbol = %symbol, %error, "failed to write trades");
                        errors.push(SymbolError {
                            symbol: symbol.clone(),
                            error,
                        });
                    }
                },
                Err(error) => {
                    warn!(symbol = %symbol, %error, "symbol skipped");
                    errors.push(SymbolError {
                        symbol: symbol.clone(),
                        error,
                    });
                }
            }

            if n + 1 < shard.len() && !settings.data.batch_sleep.is_zero() {
                debug!(delay = ?settings.data.batch_sleep, "sleeping between symbols");
                std::thread::sleep(settings.data.batch_sleep);
            }
        }

        artifacts.extend(self.artifacts.write_shard_summary(&shard, &completed, &errors)?);

        if let Some(sync) = self.sync
            && settings.output.sync
        {
            sync.sync(&settings.output.results_prefix)?;
            info!(prefix = %settings.output.results_prefix, "artifacts synced");
        }

        info!(
            shard = %shard.label(),
            completed = completed.len(),
            failed = errors.len(),
            "shard finished"
        );

        Ok(ShardResult {
            shard,
            completed,
            errors,
            artifacts,
            dry_run: false,
        })
    }

    fn run_symbol(
        &self,
        simulator: &Simulator<'_>,
        symbol: &str,
    ) -> Result<SymbolResult, BtoptError> {
        let data = &self.settings.data;
        let series = retry_with_backoff(&self.retry, symbol, || {
            self.data.fetch_series(symbol, &data.timeframe, data.lookback_days)
        })?;
        series.validate()?;

        match (&self.settings.options, self.chain) {
            (Some(options), Some(chain)) => run_symbol_options(
                simulator,
                &series,
                &options.template,
                &options.exits,
                chain,
                self.settings.sweep.min_trades,
            ),
            (Some(_), None) => Err(BtoptError::missing("options", "option_chain")),
            (None, _) => Ok(run_symbol_sweep(
                simulator,
                &series,
                &self.settings.sweep.expand(),
                self.settings.sweep.min_trades,
            )),
        }
    }
}
