//! CSV bar-file data adapter.
//!
//! Reads `{data_dir}/{SYMBOL}_{timeframe}.csv` with header
//! `timestamp,open,high,low,close,volume[,rsi,ema,macd,macd_signal,atr]`.
//! Indicator columns are optional and an empty cell is a warm-up gap.

use crate::domain::bar::Bar;
use crate::domain::error::BtoptError;
use crate::domain::series::IndicatorSeries;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const INDICATOR_COLUMNS: [&str; 5] = ["rsi", "ema", "macd", "macd_signal", "atr"];

pub struct CsvDataAdapter {
    base_path: PathBuf,
}

impl CsvDataAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, timeframe))
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

struct Columns {
    ohlcv: [usize; 6],
    indicators: [Option<usize>; 5],
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord, symbol: &str) -> Result<Self, BtoptError> {
        let find = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        let mut ohlcv = [0; 6];
        for (slot, name) in ohlcv
            .iter_mut()
            .zip(["timestamp", "open", "high", "low", "close", "volume"])
        {
            *slot = find(name).ok_or_else(|| BtoptError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("missing {} column", name),
            })?;
        }
        Ok(Columns {
            ohlcv,
            indicators: INDICATOR_COLUMNS.map(find),
        })
    }
}

impl DataPort for CsvDataAdapter {
    fn fetch_series(
        &self,
        symbol: &str,
        timeframe: &str,
        lookback_days: u32,
    ) -> Result<IndicatorSeries, BtoptError> {
        let path = self.csv_path(symbol, timeframe);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BtoptError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("no bar file at {}", path.display()),
            },
            _ => BtoptError::TransientFetch {
                symbol: symbol.to_string(),
                reason: format!("failed to read {}: {}", path.display(), e),
            },
        })?;

        let bad = |reason: String| BtoptError::DataUnavailable {
            symbol: symbol.to_string(),
            reason,
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| bad(format!("CSV header error: {}", e)))?
            .clone();
        let cols = Columns::from_headers(&headers, symbol)?;

        let mut bars = Vec::new();
        let mut indicators: [Vec<Option<f64>>; 5] = Default::default();

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| bad(format!("CSV parse error: {}", e)))?;
            let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");
            let number = |idx: usize, name: &str| -> Result<f64, BtoptError> {
                field(idx)
                    .parse::<f64>()
                    .map_err(|e| bad(format!("invalid {} value on row {}: {}", name, line + 1, e)))
            };

            let [ts, open, high, low, close, volume] = cols.ohlcv;
            let timestamp = parse_timestamp(field(ts))
                .ok_or_else(|| bad(format!("invalid timestamp on row {}", line + 1)))?;
            let volume = number(volume, "volume")?;

            bars.push(Bar {
                timestamp,
                open: number(open, "open")?,
                high: number(high, "high")?,
                low: number(low, "low")?,
                close: number(close, "close")?,
                volume: volume.max(0.0) as u64,
            });

            for (column, idx) in indicators.iter_mut().zip(cols.indicators) {
                let value = idx
                    .and_then(|i| field(i).parse::<f64>().ok())
                    .filter(|v| v.is_finite());
                column.push(value);
            }
        }

        let start = match bars.last() {
            Some(last) if lookback_days > 0 => {
                let cutoff = last.timestamp - chrono::Duration::days(i64::from(lookback_days));
                bars.iter().position(|b| b.timestamp >= cutoff).unwrap_or(0)
            }
            _ => 0,
        };
        debug!(symbol, rows = bars.len(), kept = bars.len() - start, "loaded bars");

        let [rsi, ema, macd, macd_signal, atr] = indicators.map(|c| c[start..].to_vec());
        Ok(IndicatorSeries::from_bars(symbol, bars[start..].to_vec())
            .with_rsi(rsi)
            .with_ema(ema)
            .with_macd(macd, macd_signal)
            .with_atr(atr))
    }

    fn list_symbols(&self) -> Result<Vec<String>, BtoptError> {
        let entries = fs::read_dir(&self.base_path)?;

        let mut symbols = BTreeSet::new();
        for entry in entries {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".csv")
                && let Some((symbol, _)) = stem.rsplit_once('_')
                && !symbol.is_empty()
            {
                symbols.insert(symbol.to_string());
            }
        }
        Ok(symbols.into_iter().collect())
    }
}
