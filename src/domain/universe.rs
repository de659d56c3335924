//! Universe construction: symbol parsing, source selection and liquidity ranking.
//!
//! The universe order is significant: shards are contiguous slices of it, so
//! every loader preserves the order of its input.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{info, warn};

use crate::domain::bar::Bar;
use crate::domain::chunk::chunk_symbols;
use crate::domain::error::BtoptError;
use crate::domain::retry::{retry_with_backoff, RetryPolicy};
use crate::ports::broker_port::UniverseCatalogPort;
use crate::ports::data_port::DataPort;

pub const DEFAULT_SYMBOLS: &str = "SPY,QQQ,AAPL,MSFT,NVDA,AMD";
pub const RANK_BATCH_SIZE: usize = 150;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

/// Strict comma-separated list: empty tokens and duplicates are errors.
pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateSymbol(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

/// Lenient normalisation: uppercase, `.` becomes `-` (BRK.B -> BRK-B), empties
/// dropped, first occurrence kept.
pub fn normalize_symbols<I, S>(symbols: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    symbols
        .into_iter()
        .map(|s| s.as_ref().trim().to_uppercase().replace('.', "-"))
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniverseSource {
    Curated,
    File,
    Broker,
}

impl fmt::Display for UniverseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniverseSource::Curated => write!(f, "curated"),
            UniverseSource::File => write!(f, "file"),
            UniverseSource::Broker => write!(f, "broker"),
        }
    }
}

impl FromStr for UniverseSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "curated" => Ok(UniverseSource::Curated),
            "file" => Ok(UniverseSource::File),
            "broker" => Ok(UniverseSource::Broker),
            other => Err(format!("unknown universe source '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniverseSettings {
    pub source: UniverseSource,
    pub symbols: Vec<String>,
    pub file: Option<PathBuf>,
    pub limit_symbols: Option<Vec<String>>,
    pub active_only: bool,
}

impl Default for UniverseSettings {
    fn default() -> Self {
        UniverseSettings {
            source: UniverseSource::Curated,
            symbols: normalize_symbols(DEFAULT_SYMBOLS.split(',')),
            file: None,
            limit_symbols: None,
            active_only: true,
        }
    }
}

/// Read a newline- or comma-separated symbol file.
pub fn read_symbol_file(path: &Path) -> Result<Vec<String>, BtoptError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(normalize_symbols(
        raw.split(|c: char| c == ',' || c == '\n' || c == '\r'),
    ))
}

/// Resolve the ordered universe for `settings`. The catalog is only consulted
/// for the broker source.
pub fn load_universe(
    settings: &UniverseSettings,
    catalog: Option<&dyn UniverseCatalogPort>,
) -> Result<Vec<String>, BtoptError> {
    let symbols = match settings.source {
        UniverseSource::Curated => settings.symbols.clone(),
        UniverseSource::File => {
            let path = settings
                .file
                .as_deref()
                .ok_or_else(|| BtoptError::missing("universe", "file"))?;
            read_symbol_file(path)?
        }
        UniverseSource::Broker => {
            let catalog = catalog.ok_or_else(|| BtoptError::missing("live", "broker"))?;
            let assets = catalog.list_assets(settings.active_only)?;
            normalize_symbols(assets.iter().map(|a| a.symbol.as_str()))
        }
    };

    let symbols = match &settings.limit_symbols {
        Some(limit) => {
            let keep: HashSet<&str> = limit.iter().map(String::as_str).collect();
            symbols
                .into_iter()
                .filter(|s| keep.contains(s.as_str()))
                .collect()
        }
        None => symbols,
    };

    info!(source = %settings.source, count = symbols.len(), "universe loaded");
    Ok(symbols)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedSymbol {
    pub ticker: String,
    pub med_price: f64,
    pub med_dollar: f64,
    pub rank: usize,
}

/// Median of the finite values in `values`, `None` when there are none.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        Some((v[mid - 1] + v[mid]) / 2.0)
    } else {
        Some(v[mid])
    }
}

/// Rank symbols by median daily dollar volume over the last `lookback_days` bars.
///
/// Symbols below `min_price` median close or `min_dollar_volume` median dollar
/// volume are dropped. Ties keep input order. Ranks start at 1.
pub fn rank_by_dollar_volume(
    histories: &[(String, Vec<Bar>)],
    lookback_days: usize,
    min_price: f64,
    min_dollar_volume: f64,
) -> Vec<RankedSymbol> {
    let mut ranked: Vec<RankedSymbol> = histories
        .iter()
        .filter_map(|(ticker, bars)| {
            let tail = &bars[bars.len().saturating_sub(lookback_days)..];
            let closes: Vec<f64> = tail.iter().map(|b| b.close).collect();
            let dollars: Vec<f64> = tail.iter().map(Bar::dollar_volume).collect();
            let med_price = median(&closes)?;
            let med_dollar = median(&dollars)?;
            (med_price >= min_price && med_dollar >= min_dollar_volume).then(|| RankedSymbol {
                ticker: ticker.clone(),
                med_price,
                med_dollar,
                rank: 0,
            })
        })
        .collect();

    ranked.sort_by(|a, b| b.med_dollar.total_cmp(&a.med_dollar));
    for (i, r) in ranked.iter_mut().enumerate() {
        r.rank = i + 1;
    }
    ranked
}

/// Fetch daily histories in batches and rank them. Symbols whose history
/// cannot be fetched are skipped with a warning.
pub fn fetch_and_rank(
    data: &dyn DataPort,
    symbols: &[String],
    lookback_days: u32,
    min_price: f64,
    min_dollar_volume: f64,
    policy: &RetryPolicy,
) -> Vec<RankedSymbol> {
    let mut histories = Vec::with_capacity(symbols.len());
    let fetch_days = lookback_days.max(30) + 5;

    for (n, batch) in chunk_symbols(symbols, RANK_BATCH_SIZE).enumerate() {
        info!(batch = n + 1, size = batch.len(), "fetching ranking histories");
        for symbol in batch {
            match retry_with_backoff(policy, symbol, || data.fetch_bars(symbol, "1d", fetch_days)) {
                Ok(bars) => histories.push((symbol.clone(), bars)),
                Err(e) => warn!(symbol = %symbol, error = %e, "skipping symbol in ranking"),
            }
        }
    }

    rank_by_dollar_volume(&histories, lookback_days as usize, min_price, min_dollar_volume)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::broker_port::Asset;
    use chrono::NaiveDate;
    use std::cell::Cell;

    fn daily(closes_volumes: &[(f64, u64)]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes_volumes
            .iter()
            .enumerate()
            .map(|(i, &(close, volume))| Bar {
                timestamp: (start + chrono::Days::new(i as u64))
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume,
            })
            .collect()
    }

    struct Catalog {
        requested_active_only: Cell<Option<bool>>,
    }

    impl UniverseCatalogPort for Catalog {
        fn list_assets(&self, active_only: bool) -> Result<Vec<Asset>, BtoptError> {
            self.requested_active_only.set(Some(active_only));
            Ok(vec![
                Asset {
                    symbol: "brk.b".into(),
                    active: true,
                    tradable: true,
                },
                Asset {
                    symbol: "AAPL".into(),
                    active: true,
                    tradable: true,
                },
            ])
        }
    }

    #[test]
    fn test_parse_codes_basic() {
        let result = parse_codes("SPY, qqq ,AAPL").unwrap();
        assert_eq!(result, vec!["SPY", "QQQ", "AAPL"]);
    }

    #[test]
    fn test_parse_codes_empty_token() {
        assert!(matches!(parse_codes("SPY,,QQQ"), Err(UniverseError::EmptyToken)));
    }

    #[test]
    fn test_parse_codes_duplicate() {
        let result = parse_codes("SPY,QQQ,spy");
        assert!(matches!(result, Err(UniverseError::DuplicateSymbol(s)) if s == "SPY"));
    }

    #[test]
    fn normalize_keeps_first_occurrence() {
        let result = normalize_symbols(["brk.b", "", " aapl ", "AAPL", "BRK-B", "msft"]);
        assert_eq!(result, vec!["BRK-B", "AAPL", "MSFT"]);
    }

    #[test]
    fn curated_universe_with_limit() {
        let settings = UniverseSettings {
            limit_symbols: Some(vec!["AAPL".into(), "SPY".into()]),
            ..UniverseSettings::default()
        };
        let symbols = load_universe(&settings, None).unwrap();
        assert_eq!(symbols, vec!["SPY", "AAPL"]);
    }

    #[test]
    fn file_source_requires_file() {
        let settings = UniverseSettings {
            source: UniverseSource::File,
            ..UniverseSettings::default()
        };
        let err = load_universe(&settings, None).unwrap_err();
        assert!(matches!(err, BtoptError::ConfigMissing { key, .. } if key == "file"));
    }

    #[test]
    fn file_source_reads_mixed_separators() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"spy,qqq\naapl\n\nspy\n").unwrap();
        let settings = UniverseSettings {
            source: UniverseSource::File,
            file: Some(file.path().to_path_buf()),
            ..UniverseSettings::default()
        };
        assert_eq!(load_universe(&settings, None).unwrap(), vec!["SPY", "QQQ", "AAPL"]);
    }

    #[test]
    fn broker_source_forwards_active_only() {
        let catalog = Catalog {
            requested_active_only: Cell::new(None),
        };
        let settings = UniverseSettings {
            source: UniverseSource::Broker,
            active_only: false,
            ..UniverseSettings::default()
        };
        let symbols = load_universe(&settings, Some(&catalog)).unwrap();
        assert_eq!(symbols, vec!["BRK-B", "AAPL"]);
        assert_eq!(catalog.requested_active_only.get(), Some(false));
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[f64::NAN]), None);
    }

    #[test]
    fn ranking_filters_and_orders() {
        let histories = vec![
            ("LOW".to_string(), daily(&[(1.0, 10_000_000); 5])),
            ("MID".to_string(), daily(&[(10.0, 20_000); 5])),
            ("TOP".to_string(), daily(&[(50.0, 100_000); 5])),
            ("THIN".to_string(), daily(&[(20.0, 100); 5])),
        ];
        let ranked = rank_by_dollar_volume(&histories, 30, 2.0, 100_000.0);
        let tickers: Vec<&str> = ranked.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["TOP", "MID"]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[1].rank, 2);
        assert!((ranked[0].med_dollar - 5_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn ranking_uses_lookback_tail() {
        let mut rows = vec![(100.0, 1_000_000); 10];
        rows.extend(vec![(10.0, 1_000); 3]);
        let histories = vec![("FADE".to_string(), daily(&rows))];
        // last 3 bars: median dollar 10_000, below threshold
        assert!(rank_by_dollar_volume(&histories, 3, 2.0, 100_000.0).is_empty());
        assert_eq!(rank_by_dollar_volume(&histories, 13, 2.0, 100_000.0).len(), 1);
    }
}
