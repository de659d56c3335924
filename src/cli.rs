//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvDataAdapter;
use crate::adapters::csv_option_chain::CsvOptionChain;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::gsutil_sync::GsutilSync;
use crate::adapters::paper_broker::PaperBroker;
use crate::adapters::parquet_artifacts::ParquetArtifactWriter;
use crate::adapters::ranked_csv::write_ranked_universe;
use crate::domain::config_validation::validate_run_config;
use crate::domain::error::BtoptError;
use crate::domain::live::run_live_cycle;
use crate::domain::orchestrator::{BacktestOrchestrator, ShardResult};
use crate::domain::retry::{retry_with_backoff, RetryPolicy};
use crate::domain::settings::RunSettings;
use crate::domain::shard::plan_shard;
use crate::domain::universe::{fetch_and_rank, load_universe};
use crate::ports::broker_port::{BrokerPort, UniverseCatalogPort};
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "btopt", about = "Sharded strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct ShardArgs {
    #[arg(long)]
    pub shard_index: Option<usize>,
    #[arg(long)]
    pub shard_count: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest this process's shard of the universe
    RunShard {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        shard: ShardArgs,
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the symbols assigned to a shard
    Plan {
        #[arg(short, long)]
        config: PathBuf,
        #[command(flatten)]
        shard: ShardArgs,
    },
    /// Validate a run configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Rank the universe by median dollar volume
    Rank {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long, default_value = "data/symbols/top500.txt")]
        out: PathBuf,
        #[arg(long, default_value_t = 500)]
        n: usize,
        #[arg(long, default_value_t = 30)]
        lookback: u32,
        #[arg(long, default_value_t = 2.0)]
        min_price: f64,
        #[arg(long, default_value_t = 100_000.0)]
        min_dollar_volume: f64,
    },
    /// Run one live cycle: latest signals to sized orders
    LiveOnce {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::RunShard {
            config,
            shard,
            dry_run,
        } => run_shard(&config, shard, dry_run),
        Command::Plan { config, shard } => run_plan(&config, shard),
        Command::Validate { config } => run_validate(&config),
        Command::Rank {
            config,
            out,
            n,
            lookback,
            min_price,
            min_dollar_volume,
        } => run_rank(&config, &out, n, lookback, min_price, min_dollar_volume),
        Command::LiveOnce { config } => run_live_once(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, BtoptError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// Typed settings with CLI overrides applied.
pub fn load_settings(path: &Path, shard: ShardArgs) -> Result<RunSettings, BtoptError> {
    let adapter = load_config(path)?;
    let mut settings = RunSettings::from_config(&adapter)?;
    if let Some(index) = shard.shard_index {
        settings.shard_index = index;
    }
    if let Some(count) = shard.shard_count {
        settings.shard_count = count;
    }
    Ok(settings)
}

/// Broker named in `[live] broker`. Only the in-memory paper broker exists; its
/// catalog lists the symbols that have bar files.
fn build_broker(
    settings: &RunSettings,
    data: &dyn DataPort,
) -> Result<Option<PaperBroker>, BtoptError> {
    match settings.live.broker.as_deref().map(str::trim) {
        None => Ok(None),
        Some("paper") => Ok(Some(PaperBroker::with_symbols(data.list_symbols()?))),
        Some(other) => Err(BtoptError::invalid(
            "live",
            "broker",
            format!("unknown broker '{other}', expected paper"),
        )),
    }
}

fn resolve_universe(
    settings: &RunSettings,
    data: &dyn DataPort,
) -> Result<Vec<String>, BtoptError> {
    let broker = build_broker(settings, data)?;
    let catalog = broker
        .as_ref()
        .map(|b| b as &dyn UniverseCatalogPort);
    load_universe(&settings.universe, catalog)
}

fn run_shard(config: &Path, shard: ShardArgs, dry_run: bool) -> Result<(), BtoptError> {
    let mut settings = load_settings(config, shard)?;
    settings.dry_run |= dry_run;

    let data = CsvDataAdapter::new(settings.data.data_dir.clone());
    let universe = resolve_universe(&settings, &data)?;

    let artifacts = ParquetArtifactWriter::new(settings.output.dir.clone());
    let chain = CsvOptionChain::new(settings.data.data_dir.clone());
    let sync = settings
        .output
        .bucket
        .as_deref()
        .map(|bucket| GsutilSync::new(settings.output.dir.clone(), bucket));

    let mut orchestrator = BacktestOrchestrator::new(&settings, &data, &artifacts);
    if settings.options.is_some() {
        orchestrator = orchestrator.with_option_chain(&chain);
    }
    if let Some(sync) = sync.as_ref()
        && settings.output.sync
    {
        orchestrator = orchestrator.with_sync(sync);
    }

    let result = orchestrator.run_shard(&universe)?;
    print_shard_result(&result);
    Ok(())
}

fn print_shard_result(result: &ShardResult) {
    let shard = &result.shard;
    eprintln!(
        "\n=== {} ({} symbols) ===",
        shard.label(),
        shard.len()
    );
    if result.dry_run {
        eprintln!("Dry run: {}", shard.symbols.join(", "));
        return;
    }

    eprintln!("Completed:        {}", result.completed.len());
    eprintln!("Failed:           {}", result.errors.len());
    eprintln!("Trades:           {}", result.trade_count());
    for r in &result.completed {
        let best = r
            .runs
            .iter()
            .filter(|run| run.valid)
            .max_by(|a, b| a.rollup.total_pnl.total_cmp(&b.rollup.total_pnl));
        match best {
            Some(run) => eprintln!(
                "  {:<8} best {}  pnl={:.2}  win={:.1}%  trades={}",
                r.symbol,
                run.params.label(),
                run.rollup.total_pnl,
                run.rollup.win_rate * 100.0,
                run.rollup.trades
            ),
            None => eprintln!("  {:<8} no valid runs", r.symbol),
        }
    }
    for e in &result.errors {
        eprintln!("  {:<8} error: {}", e.symbol, e.error);
    }
    for path in &result.artifacts {
        eprintln!("Wrote {}", path.display());
    }
}

fn run_plan(config: &Path, shard: ShardArgs) -> Result<(), BtoptError> {
    let settings = load_settings(config, shard)?;
    let data = CsvDataAdapter::new(settings.data.data_dir.clone());
    let universe = resolve_universe(&settings, &data)?;
    let shard = plan_shard(&universe, settings.shard_index, settings.shard_count)?;

    eprintln!(
        "{}: {} of {} symbols",
        shard.label(),
        shard.len(),
        universe.len()
    );
    for symbol in &shard.symbols {
        println!("{symbol}");
    }
    Ok(())
}

fn run_validate(config: &Path) -> Result<(), BtoptError> {
    let adapter = load_config(config)?;
    validate_run_config(&adapter)?;
    let settings = RunSettings::from_config(&adapter)?;

    eprintln!("Config validated successfully");
    eprintln!("  mode:        {:?}", settings.execution.mode);
    eprintln!("  universe:    {}", settings.universe.source);
    eprintln!(
        "  shard:       {} of {}",
        settings.shard_index, settings.shard_count
    );
    if let Some(options) = &settings.options {
        eprintln!("  template:    {}", options.template.kind());
    } else {
        eprintln!("  sweep:       {} parameterizations", settings.sweep.expand().len());
    }
    Ok(())
}

fn run_rank(
    config: &Path,
    out: &Path,
    n: usize,
    lookback: u32,
    min_price: f64,
    min_dollar_volume: f64,
) -> Result<(), BtoptError> {
    let settings = load_settings(config, ShardArgs::default())?;
    let data = CsvDataAdapter::new(settings.data.data_dir.clone());
    let universe = resolve_universe(&settings, &data)?;

    eprintln!("Ranking {} symbols...", universe.len());
    let mut ranked = fetch_and_rank(
        &data,
        &universe,
        lookback,
        min_price,
        min_dollar_volume,
        &RetryPolicy::default(),
    );
    ranked.truncate(n);

    let (txt, csv) = write_ranked_universe(out, &ranked)?;
    eprintln!("Wrote {} symbols -> {}", ranked.len(), txt.display());
    eprintln!("Diagnostics -> {}", csv.display());
    Ok(())
}

fn run_live_once(config: &Path) -> Result<(), BtoptError> {
    let settings = load_settings(config, ShardArgs::default())?;
    let data = CsvDataAdapter::new(settings.data.data_dir.clone());
    let broker = build_broker(&settings, &data)?;
    let universe = {
        let catalog = broker
            .as_ref()
            .map(|b| b as &dyn UniverseCatalogPort);
        load_universe(&settings.universe, catalog)?
    };

    let retry = RetryPolicy::default();
    let mut series = Vec::with_capacity(universe.len());
    for symbol in &universe {
        let fetched = retry_with_backoff(&retry, symbol, || {
            data.fetch_series(symbol, &settings.data.timeframe, settings.data.lookback_days)
        })
        .and_then(|s| s.validate().map(|()| s));
        match fetched {
            Ok(s) => series.push(s),
            Err(e) => eprintln!("warning: skipping {} ({})", symbol, e),
        }
    }

    let report = run_live_cycle(
        &series,
        settings.execution.paper_equity,
        settings.execution.risk_pct,
        settings.live.place_orders,
        broker.as_ref().map(|b| b as &dyn BrokerPort),
    );

    eprintln!("Planned {} orders", report.planned.len());
    for order in &report.planned {
        eprintln!(
            "  {:<8} {} {} @ {:.2}",
            order.request.symbol, order.request.side, order.request.quantity, order.price
        );
    }
    for ack in &report.submitted {
        eprintln!("  submitted {} ({})", ack.request.symbol, ack.order_id);
    }
    for (symbol, err) in &report.failed {
        eprintln!("  {:<8} failed: {}", symbol, err);
    }
    Ok(())
}
