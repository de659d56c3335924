//! Typed run settings assembled from a `ConfigPort`.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::domain::config_validation::{is_options_mode, validate_run_config};
use crate::domain::error::BtoptError;
use crate::domain::exits::{EquityExitRules, ExitRules};
use crate::domain::fill::{
    LiquidityGates, DEFAULT_EQUITY_SPREAD_PCT, DEFAULT_MAX_SPREAD_PCT, DEFAULT_MIN_OPEN_INTEREST,
    DEFAULT_MIN_VOLUME, DEFAULT_SLIP_FRAC_OF_HALF,
};
use crate::domain::strategy::{DteRange, StrikeRule, TemplateKind, TemplateSpec, DEFAULT_DTE};
use crate::domain::universe::{normalize_symbols, UniverseSettings, UniverseSource, DEFAULT_SYMBOLS};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_TAKE_PROFIT_GRID: [f64; 3] = [0.01, 0.015, 0.02];
pub const DEFAULT_STOP_LOSS_GRID: [f64; 2] = [0.005, 0.01];
pub const DEFAULT_MAX_BARS_GRID: [usize; 2] = [20, 30];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Equity,
    Options,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub data_dir: PathBuf,
    pub timeframe: String,
    pub lookback_days: u32,
    pub batch_sleep: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    pub take_profit_grid: Vec<f64>,
    pub stop_loss_grid: Vec<f64>,
    pub max_bars_grid: Vec<usize>,
    pub min_trades: usize,
}

impl SweepSettings {
    /// Every take-profit × stop-loss × max-bars combination, in grid order.
    pub fn expand(&self) -> Vec<EquityExitRules> {
        let mut out = Vec::with_capacity(
            self.take_profit_grid.len() * self.stop_loss_grid.len() * self.max_bars_grid.len(),
        );
        for &take_profit_pct in &self.take_profit_grid {
            for &stop_loss_pct in &self.stop_loss_grid {
                for &max_bars in &self.max_bars_grid {
                    out.push(EquityExitRules {
                        take_profit_pct,
                        stop_loss_pct,
                        max_bars,
                    });
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSettings {
    pub mode: ExecutionMode,
    pub max_positions: usize,
    pub paper_equity: f64,
    pub risk_pct: f64,
    pub gates: LiquidityGates,
    pub slip_frac_of_half: f64,
    pub equity_spread_pct: f64,
    pub fee_per_share: f64,
    pub fee_per_contract: f64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        ExecutionSettings {
            mode: ExecutionMode::Equity,
            max_positions: 10,
            paper_equity: 100_000.0,
            risk_pct: 0.01,
            gates: LiquidityGates::default(),
            slip_frac_of_half: DEFAULT_SLIP_FRAC_OF_HALF,
            equity_spread_pct: DEFAULT_EQUITY_SPREAD_PCT,
            fee_per_share: 0.0,
            fee_per_contract: 0.65,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionsSettings {
    pub template: TemplateSpec,
    pub exits: ExitRules,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub results_prefix: String,
    pub sync: bool,
    pub bucket: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSettings {
    pub place_orders: bool,
    pub broker: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub universe: UniverseSettings,
    pub shard_index: usize,
    pub shard_count: usize,
    pub data: DataSettings,
    pub sweep: SweepSettings,
    pub execution: ExecutionSettings,
    pub options: Option<OptionsSettings>,
    pub output: OutputSettings,
    pub dry_run: bool,
    pub live: LiveSettings,
}

impl RunSettings {
    /// Validate `config` and build typed settings from it.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BtoptError> {
        validate_run_config(config)?;

        let options = if is_options_mode(config)? {
            Some(options_settings(config)?)
        } else {
            None
        };

        Ok(RunSettings {
            universe: universe_settings(config)?,
            shard_index: config.get_int("shard", "shard_index", 0).max(0) as usize,
            shard_count: config.get_int("shard", "shard_count", 1).max(1) as usize,
            data: DataSettings {
                data_dir: PathBuf::from(string_or(config, "data", "data_dir", "data/bars")),
                timeframe: string_or(config, "data", "timeframe", "5m"),
                lookback_days: non_negative_u32(config, "data", "lookback_days", 30),
                batch_sleep: batch_sleep(config),
            },
            sweep: SweepSettings {
                take_profit_grid: f64_grid(config, "take_profit_grid", &DEFAULT_TAKE_PROFIT_GRID),
                stop_loss_grid: f64_grid(config, "stop_loss_grid", &DEFAULT_STOP_LOSS_GRID),
                max_bars_grid: usize_grid(config, "max_bars_grid", &DEFAULT_MAX_BARS_GRID),
                min_trades: non_negative_int(config, "sweep", "min_trades", 1) as usize,
            },
            execution: ExecutionSettings {
                mode: if options.is_some() {
                    ExecutionMode::Options
                } else {
                    ExecutionMode::Equity
                },
                max_positions: config.get_int("execution", "max_positions", 10) as usize,
                paper_equity: config.get_double("execution", "paper_equity", 100_000.0),
                risk_pct: config.get_double("execution", "risk_pct", 0.01),
                gates: LiquidityGates {
                    max_spread_pct: config.get_double(
                        "execution",
                        "max_spread_pct",
                        DEFAULT_MAX_SPREAD_PCT,
                    ),
                    min_open_interest: non_negative_int(
                        config,
                        "execution",
                        "min_open_interest",
                        DEFAULT_MIN_OPEN_INTEREST as i64,
                    ) as u64,
                    min_volume: non_negative_int(
                        config,
                        "execution",
                        "min_volume",
                        DEFAULT_MIN_VOLUME as i64,
                    ) as u64,
                },
                slip_frac_of_half: config.get_double(
                    "execution",
                    "slip_frac_of_half",
                    DEFAULT_SLIP_FRAC_OF_HALF,
                ),
                equity_spread_pct: config.get_double(
                    "execution",
                    "equity_spread_pct",
                    DEFAULT_EQUITY_SPREAD_PCT,
                ),
                fee_per_share: config.get_double("execution", "fee_per_share", 0.0),
                fee_per_contract: config.get_double("execution", "fee_per_contract", 0.65),
            },
            options,
            output: OutputSettings {
                dir: PathBuf::from(string_or(config, "output", "dir", "data/parquet")),
                results_prefix: string_or(config, "output", "results_prefix", "nightly"),
                sync: config.get_bool("output", "sync", false),
                bucket: non_empty(config, "output", "bucket"),
            },
            dry_run: config.get_bool("run", "dry_run", false),
            live: LiveSettings {
                place_orders: config.get_bool("live", "place_orders", false),
                broker: non_empty(config, "live", "broker"),
            },
        })
    }
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn string_or(config: &dyn ConfigPort, section: &str, key: &str, default: &str) -> String {
    non_empty(config, section, key).unwrap_or_else(|| default.to_string())
}

fn non_negative_int(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> i64 {
    let value = config.get_int(section, key, default);
    if value < 0 {
        warn!(section, key, value, default, "negative value, using default");
        default
    } else {
        value
    }
}

fn non_negative_u32(config: &dyn ConfigPort, section: &str, key: &str, default: u32) -> u32 {
    let value = non_negative_int(config, section, key, i64::from(default));
    u32::try_from(value).unwrap_or_else(|_| {
        warn!(section, key, value, default, "value out of range, using default");
        default
    })
}

fn batch_sleep(config: &dyn ConfigPort) -> Duration {
    let secs = config.get_double("data", "batch_sleep_s", 0.0);
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

fn parse_grid<T: std::str::FromStr + Copy>(
    config: &dyn ConfigPort,
    key: &str,
    default: &[T],
) -> Vec<T> {
    let Some(raw) = non_empty(config, "sweep", key) else {
        return default.to_vec();
    };
    let parsed: Result<Vec<T>, _> = raw.split(',').map(|t| t.trim().parse::<T>()).collect();
    match parsed {
        Ok(values) if !values.is_empty() => values,
        _ => {
            warn!(key, raw = %raw, "invalid sweep grid, using default");
            default.to_vec()
        }
    }
}

fn f64_grid(config: &dyn ConfigPort, key: &str, default: &[f64]) -> Vec<f64> {
    let grid = parse_grid(config, key, default);
    if grid.iter().all(|v| v.is_finite() && *v > 0.0) {
        grid
    } else {
        warn!(key, "sweep grid values must be positive, using default");
        default.to_vec()
    }
}

fn usize_grid(config: &dyn ConfigPort, key: &str, default: &[usize]) -> Vec<usize> {
    let grid = parse_grid(config, key, default);
    if grid.iter().all(|&v| v > 0) {
        grid
    } else {
        warn!(key, "sweep grid values must be positive, using default");
        default.to_vec()
    }
}

fn universe_settings(config: &dyn ConfigPort) -> Result<UniverseSettings, BtoptError> {
    let source = match non_empty(config, "universe", "universe_source") {
        Some(s) => s
            .parse::<UniverseSource>()
            .map_err(|reason| BtoptError::invalid("universe", "universe_source", reason))?,
        None => UniverseSource::Curated,
    };
    let symbols = string_or(config, "universe", "symbols", DEFAULT_SYMBOLS);
    let limit_symbols =
        non_empty(config, "universe", "limit_symbols").map(|s| normalize_symbols(s.split(',')));

    Ok(UniverseSettings {
        source,
        symbols: normalize_symbols(symbols.split(',')),
        file: non_empty(config, "universe", "file").map(PathBuf::from),
        limit_symbols,
        active_only: config.get_bool("universe", "active_only", true),
    })
}

fn options_settings(config: &dyn ConfigPort) -> Result<OptionsSettings, BtoptError> {
    let kind = non_empty(config, "options", "template")
        .ok_or_else(|| BtoptError::missing("options", "template"))?
        .parse::<TemplateKind>()
        .map_err(|reason| BtoptError::invalid("options", "template", reason))?;

    let dte = DteRange {
        min_days: non_negative_u32(config, "options", "dte_min", DEFAULT_DTE.min_days),
        max_days: non_negative_u32(config, "options", "dte_max", DEFAULT_DTE.max_days),
    };
    let d = |key: &str, default: f64| config.get_double("options", key, default);

    let template = match TemplateSpec::with_defaults(kind) {
        TemplateSpec::LongCall { delta, .. } => TemplateSpec::LongCall {
            delta: d("delta", delta),
            dte,
        },
        TemplateSpec::LongPut { delta, .. } => TemplateSpec::LongPut {
            delta: d("delta", delta),
            dte,
        },
        TemplateSpec::VerticalCreditBullPut {
            short_delta,
            long_delta,
            ..
        } => TemplateSpec::VerticalCreditBullPut {
            short_delta: d("short_delta", short_delta),
            long_delta: d("long_delta", long_delta),
            dte,
        },
        TemplateSpec::Straddle { atm_rule, .. } => {
            let atm_rule = match non_empty(config, "options", "atm_pct_otm") {
                Some(_) => StrikeRule::PercentOtm(d("atm_pct_otm", 0.0)),
                None => match atm_rule {
                    StrikeRule::Delta(delta) => StrikeRule::Delta(d("atm_delta", delta)),
                    other => other,
                },
            };
            TemplateSpec::Straddle { atm_rule, dte }
        }
        TemplateSpec::IronCondor {
            call_short,
            call_long,
            put_short,
            put_long,
            ..
        } => TemplateSpec::IronCondor {
            call_short: d("call_short", call_short),
            call_long: d("call_long", call_long),
            put_short: d("put_short", put_short),
            put_long: d("put_long", put_long),
            dte,
        },
    };
    template.validate()?;

    let exits = ExitRules {
        profit_target_pct: d("profit_target_pct", f64::NAN),
        max_loss_mult_credit: d("max_loss_mult_credit", f64::NAN),
        time_stop_days_before_expiry: config.get_int("options", "time_stop_days", -1),
    };
    exits.validate()?;

    Ok(OptionsSettings { template, exits })
}
