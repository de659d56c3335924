//! Local artifact writer: one parquet trade table per symbol plus CSV shard
//! summaries.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, StringArray, TimestampMicrosecondArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_writer::ArrowWriter;
use tracing::info;

use crate::domain::backtest::{ParamRun, SymbolResult};
use crate::domain::error::BtoptError;
use crate::domain::orchestrator::SymbolError;
use crate::domain::position::Trade;
use crate::domain::shard::Shard;
use crate::ports::artifact_port::ArtifactPort;

const SUMMARY_HEADER: [&str; 24] = [
    "symbol",
    "strategy",
    "params",
    "take_profit_pct",
    "stop_loss_pct",
    "max_bars",
    "trades",
    "trades_won",
    "trades_lost",
    "win_rate",
    "total_pnl",
    "avg_pnl",
    "avg_return_on_risk",
    "profit_factor",
    "largest_win",
    "largest_loss",
    "total_fees",
    "total_slippage",
    "worst_mae",
    "best_mfe",
    "valid",
    "skipped_liquidity",
    "skipped_sizing",
    "skipped_other",
];

pub struct ParquetArtifactWriter {
    dir: PathBuf,
}

impl ParquetArtifactWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn trades_path(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.parquet", symbol, timeframe))
    }

    fn ensure_dir(&self) -> Result<(), BtoptError> {
        fs::create_dir_all(&self.dir).map_err(|e| artifact_error(&self.dir, e))
    }
}

fn artifact_error(path: &Path, err: impl std::fmt::Display) -> BtoptError {
    BtoptError::Artifact {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn micros(ts: chrono::NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_micros()
}

fn trade_schema() -> Schema {
    let ts = || DataType::Timestamp(TimeUnit::Microsecond, None);
    Schema::new(vec![
        Field::new("symbol", DataType::Utf8, false),
        Field::new("take_profit_pct", DataType::Float64, true),
        Field::new("stop_loss_pct", DataType::Float64, true),
        Field::new("max_bars", DataType::UInt64, true),
        Field::new("trade_id", DataType::UInt64, false),
        Field::new("strategy", DataType::Utf8, false),
        Field::new("entry_time", ts(), false),
        Field::new("exit_time", ts(), false),
        Field::new("quantity", DataType::UInt64, false),
        Field::new("entry_price", DataType::Float64, false),
        Field::new("exit_price", DataType::Float64, false),
        Field::new("exit_reason", DataType::Utf8, false),
        Field::new("pnl", DataType::Float64, false),
        Field::new("win", DataType::Boolean, false),
        Field::new("return_on_risk", DataType::Float64, false),
        Field::new("mae", DataType::Float64, false),
        Field::new("mfe", DataType::Float64, false),
        Field::new("fees", DataType::Float64, false),
        Field::new("slippage", DataType::Float64, false),
        Field::new("context", DataType::Utf8, false),
    ])
}

fn f64_column<'a>(
    rows: &[(&'a ParamRun, usize)],
    f: impl Fn(&'a ParamRun, usize) -> f64,
) -> ArrayRef {
    Arc::new(Float64Array::from(
        rows.iter().map(|&(run, i)| f(run, i)).collect::<Vec<_>>(),
    ))
}

fn trade_at<'a>(run: &'a ParamRun, i: usize) -> &'a Trade {
    &run.trades[i]
}

/// Flatten every run's trades into one record batch.
fn trade_batch(result: &SymbolResult) -> Result<RecordBatch, arrow::error::ArrowError> {
    let rows: Vec<(&ParamRun, usize)> = result
        .runs
        .iter()
        .flat_map(|run| (0..run.trades.len()).map(move |i| (run, i)))
        .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec![result.symbol.as_str(); rows.len()])),
        Arc::new(Float64Array::from(
            rows.iter().map(|(r, _)| r.params.take_profit_pct()).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter().map(|(r, _)| r.params.stop_loss_pct()).collect::<Vec<_>>(),
        )),
        Arc::new(UInt64Array::from(
            rows.iter()
                .map(|(r, _)| r.params.max_bars().map(|m| m as u64))
                .collect::<Vec<_>>(),
        )),
        Arc::new(UInt64Array::from(
            rows.iter().map(|&(r, i)| trade_at(r, i).id).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            rows.iter()
                .map(|&(r, i)| trade_at(r, i).position.strategy_name())
                .collect::<Vec<_>>(),
        )),
        Arc::new(TimestampMicrosecondArray::from(
            rows.iter()
                .map(|&(r, i)| micros(trade_at(r, i).position.entry_time))
                .collect::<Vec<_>>(),
        )),
        Arc::new(TimestampMicrosecondArray::from(
            rows.iter()
                .map(|&(r, i)| micros(trade_at(r, i).exit_time))
                .collect::<Vec<_>>(),
        )),
        Arc::new(UInt64Array::from(
            rows.iter()
                .map(|&(r, i)| trade_at(r, i).position.quantity)
                .collect::<Vec<_>>(),
        )),
        f64_column(&rows, |r, i| trade_at(r, i).position.entry_price),
        f64_column(&rows, |r, i| trade_at(r, i).exit_price),
        Arc::new(StringArray::from(
            rows.iter()
                .map(|&(r, i)| trade_at(r, i).exit_reason.as_str())
                .collect::<Vec<_>>(),
        )),
        f64_column(&rows, |r, i| r.stats[i].pnl),
        Arc::new(BooleanArray::from(
            rows.iter().map(|&(r, i)| r.stats[i].win).collect::<Vec<_>>(),
        )),
        f64_column(&rows, |r, i| r.stats[i].return_on_risk),
        f64_column(&rows, |r, i| r.stats[i].mae),
        f64_column(&rows, |r, i| r.stats[i].mfe),
        f64_column(&rows, |r, i| r.stats[i].fees),
        f64_column(&rows, |r, i| r.stats[i].slippage_cost),
        Arc::new(StringArray::from(
            rows.iter()
                .map(|&(r, i)| trade_at(r, i).position.context.as_str())
                .collect::<Vec<_>>(),
        )),
    ];

    RecordBatch::try_new(Arc::new(trade_schema()), columns)
}

fn opt_to_string<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

impl ArtifactPort for ParquetArtifactWriter {
    fn write_symbol_trades(
        &self,
        result: &SymbolResult,
        timeframe: &str,
    ) -> Result<PathBuf, BtoptError> {
        self.ensure_dir()?;
        let path = self.trades_path(&result.symbol, timeframe);

        let batch = trade_batch(result).map_err(|e| artifact_error(&path, e))?;
        let file = File::create(&path).map_err(|e| artifact_error(&path, e))?;
        let mut writer =
            ArrowWriter::try_new(file, batch.schema(), None).map_err(|e| artifact_error(&path, e))?;
        writer.write(&batch).map_err(|e| artifact_error(&path, e))?;
        writer.close().map_err(|e| artifact_error(&path, e))?;

        info!(path = %path.display(), rows = batch.num_rows(), "wrote trades");
        Ok(path)
    }

    fn write_shard_summary(
        &self,
        shard: &Shard,
        results: &[SymbolResult],
        errors: &[SymbolError],
    ) -> Result<Vec<PathBuf>, BtoptError> {
        self.ensure_dir()?;
        let summary_path = self.dir.join(format!("{}.csv", shard.label()));
        let errors_path = self.dir.join(format!("{}_errors.csv", shard.label()));

        let mut wtr =
            csv::Writer::from_path(&summary_path).map_err(|e| artifact_error(&summary_path, e))?;
        wtr.write_record(SUMMARY_HEADER)
            .map_err(|e| artifact_error(&summary_path, e))?;
        for result in results {
            for run in &result.runs {
                let r = &run.rollup;
                let s = &run.skips;
                wtr.write_record([
                    result.symbol.clone(),
                    result.strategy.clone(),
                    run.params.label(),
                    opt_to_string(run.params.take_profit_pct()),
                    opt_to_string(run.params.stop_loss_pct()),
                    opt_to_string(run.params.max_bars()),
                    r.trades.to_string(),
                    r.trades_won.to_string(),
                    r.trades_lost.to_string(),
                    format!("{:.4}", r.win_rate),
                    format!("{:.2}", r.total_pnl),
                    format!("{:.2}", r.avg_pnl),
                    format!("{:.4}", r.avg_return_on_risk),
                    format!("{:.4}", r.profit_factor),
                    format!("{:.2}", r.largest_win),
                    format!("{:.2}", r.largest_loss),
                    format!("{:.2}", r.total_fees),
                    format!("{:.2}", r.total_slippage),
                    format!("{:.2}", r.worst_mae),
                    format!("{:.2}", r.best_mfe),
                    run.valid.to_string(),
                    s.liquidity_rejected.to_string(),
                    s.sizing_zero.to_string(),
                    (s.capacity_exceeded + s.insufficient_cash + s.chain_unavailable).to_string(),
                ])
                .map_err(|e| artifact_error(&summary_path, e))?;
            }
        }
        wtr.flush().map_err(|e| artifact_error(&summary_path, e))?;

        let mut wtr =
            csv::Writer::from_path(&errors_path).map_err(|e| artifact_error(&errors_path, e))?;
        wtr.write_record(["symbol", "error"])
            .map_err(|e| artifact_error(&errors_path, e))?;
        for err in errors {
            wtr.write_record([err.symbol.as_str(), err.error.to_string().as_str()])
                .map_err(|e| artifact_error(&errors_path, e))?;
        }
        wtr.flush().map_err(|e| artifact_error(&errors_path, e))?;

        info!(
            summary = %summary_path.display(),
            symbols = results.len(),
            errors = errors.len(),
            "wrote shard summary"
        );
        Ok(vec![summary_path, errors_path])
    }
}
