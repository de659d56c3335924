//! Option chain snapshots read from CSV.
//!
//! `{dir}/{UNDERLYING}_options.csv` holds one row per contract per quote date:
//! `quote_date,contract_symbol,option_type,strike,expiry,delta,mid,spread,open_interest,volume`.
//! Files are loaded once per underlying and cached, indexed by quote date.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::domain::error::BtoptError;
use crate::domain::fill::Quote;
use crate::domain::position::OptionContract;
use crate::domain::strategy::{Leg, OptionType, StrikeRule};
use crate::ports::option_chain_port::OptionChainPort;

#[derive(Debug, Clone)]
struct ChainRow {
    contract: OptionContract,
    delta: Option<f64>,
    quote: Quote,
}

/// One underlying's snapshots keyed by quote date.
type ChainByDate = HashMap<NaiveDate, Vec<ChainRow>>;

pub struct CsvOptionChain {
    dir: PathBuf,
    cache: RefCell<HashMap<String, Rc<ChainByDate>>>,
}

impl CsvOptionChain {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn load(&self, underlying: &str) -> Result<Rc<ChainByDate>, BtoptError> {
        if let Some(chain) = self.cache.borrow().get(underlying) {
            return Ok(Rc::clone(chain));
        }

        let path = self.dir.join(format!("{}_options.csv", underlying));
        let chain_err = |reason: String| BtoptError::OptionChain {
            symbol: underlying.to_string(),
            reason,
        };
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => chain_err(format!("no chain file at {}", path.display())),
            _ => chain_err(format!("failed to read {}: {}", path.display(), e)),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut by_date = ChainByDate::new();
        let mut count = 0;
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| chain_err(format!("CSV parse error: {}", e)))?;
            let field = |i: usize| record.get(i).map(str::trim).unwrap_or("");
            let bad = |name: &str| chain_err(format!("invalid {} on row {}", name, line + 1));

            let date = |i: usize, name: &str| {
                NaiveDate::parse_from_str(field(i), "%Y-%m-%d").map_err(|_| bad(name))
            };
            let number = |i: usize, name: &str| field(i).parse::<f64>().map_err(|_| bad(name));
            let option_type = match field(2).to_ascii_lowercase().as_str() {
                "call" | "c" => OptionType::Call,
                "put" | "p" => OptionType::Put,
                _ => return Err(bad("option_type")),
            };

            let quote_date = date(0, "quote_date")?;
            count += 1;
            by_date.entry(quote_date).or_default().push(ChainRow {
                contract: OptionContract {
                    contract_symbol: field(1).to_string(),
                    underlying: underlying.to_string(),
                    option_type,
                    strike: number(3, "strike")?,
                    expiry: date(4, "expiry")?,
                },
                delta: field(5).parse::<f64>().ok(),
                quote: Quote {
                    mid: number(6, "mid")?,
                    spread: number(7, "spread")?,
                    open_interest: field(8).parse::<u64>().ok(),
                    volume: field(9).parse::<u64>().unwrap_or(0),
                },
            });
        }

        debug!(underlying, rows = count, dates = by_date.len(), "loaded option chain");
        let chain = Rc::new(by_date);
        self.cache
            .borrow_mut()
            .insert(underlying.to_string(), Rc::clone(&chain));
        Ok(chain)
    }
}

/// Distance of a row from the strike the rule asks for; smaller is better.
fn strike_distance(row: &ChainRow, rule: StrikeRule, spot: f64) -> Option<f64> {
    match rule {
        StrikeRule::Delta(target) => row.delta.map(|d| (d.abs() - target).abs()),
        StrikeRule::PercentOtm(pct) => {
            let target = match row.contract.option_type {
                OptionType::Call => spot * (1.0 + pct / 100.0),
                OptionType::Put => spot * (1.0 - pct / 100.0),
            };
            Some((row.contract.strike - target).abs())
        }
    }
}

impl OptionChainPort for CsvOptionChain {
    /// Nearest eligible expiry inside the leg's DTE window, then the strike
    /// closest to the leg's rule.
    fn select_contract(
        &self,
        underlying: &str,
        leg: &Leg,
        underlying_price: f64,
        as_of: NaiveDateTime,
    ) -> Result<(OptionContract, Quote), BtoptError> {
        let chain = self.load(underlying)?;
        let today = as_of.date();

        let eligible: Vec<&ChainRow> = chain
            .get(&today)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .filter(|r| r.contract.option_type == leg.option_type)
            .filter(|r| {
                u32::try_from((r.contract.expiry - today).num_days())
                    .is_ok_and(|dte| leg.dte.contains(dte))
            })
            .collect();

        let expiry = eligible
            .iter()
            .map(|r| r.contract.expiry)
            .min()
            .ok_or_else(|| BtoptError::OptionChain {
                symbol: underlying.to_string(),
                reason: format!(
                    "no {:?} expiry {}-{} days out on {}",
                    leg.option_type, leg.dte.min_days, leg.dte.max_days, today
                ),
            })?;

        eligible
            .into_iter()
            .filter(|r| r.contract.expiry == expiry)
            .filter_map(|r| strike_distance(r, leg.strike_rule, underlying_price).map(|d| (d, r)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, r)| (r.contract.clone(), r.quote))
            .ok_or_else(|| BtoptError::OptionChain {
                symbol: underlying.to_string(),
                reason: format!("no strike matches {:?} on {}", leg.strike_rule, today),
            })
    }

    fn mark(
        &self,
        contract: &OptionContract,
        as_of: NaiveDateTime,
    ) -> Result<Option<Quote>, BtoptError> {
        let chain = self.load(&contract.underlying)?;
        Ok(chain.get(&as_of.date()).and_then(|rows| {
            rows.iter()
                .find(|r| r.contract.contract_symbol == contract.contract_symbol)
                .map(|r| r.quote)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::{long_call, vertical_credit_bull_put, DteRange, DEFAULT_DTE};
    use tempfile::TempDir;

    const CHAIN: &str = "\
quote_date,contract_symbol,option_type,strike,expiry,delta,mid,spread,open_interest,volume
2024-03-01,SPY240315C510,call,510,2024-03-15,0.30,3.0,0.05,900,120
2024-03-01,SPY240322C505,call,505,2024-03-22,0.45,6.0,0.10,900,120
2024-03-01,SPY240322C515,call,515,2024-03-22,0.28,3.2,0.05,900,120
2024-03-01,SPY240328C515,call,515,2024-03-28,0.31,4.0,0.05,900,120
2024-03-01,SPY240322P490,put,490,2024-03-22,-0.31,2.5,0.05,800,90
2024-03-01,SPY240322P480,put,480,2024-03-22,-0.14,1.1,0.05,700,80
2024-03-04,SPY240322C515,call,515,2024-03-22,0.20,2.0,0.05,900,130
";

    fn chain() -> (TempDir, CsvOptionChain) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("SPY_options.csv"), CHAIN).unwrap();
        let chain = CsvOptionChain::new(dir.path().to_path_buf());
        (dir, chain)
    }

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(15, 55, 0)
            .unwrap()
    }

    #[test]
    fn selects_nearest_expiry_in_window_then_closest_delta() {
        let (_dir, chain) = chain();
        let leg = &long_call(0.30, DEFAULT_DTE)[0];
        let (contract, quote) = chain.select_contract("SPY", leg, 500.0, at(1)).unwrap();
        // 03-15 is 14 days out, outside 20-30; 03-22 is the nearest eligible expiry
        assert_eq!(contract.contract_symbol, "SPY240322C515");
        assert_eq!(quote.open_interest, Some(900));
    }

    #[test]
    fn put_delta_matches_by_magnitude() {
        let (_dir, chain) = chain();
        let legs = vertical_credit_bull_put(0.30, 0.15, DEFAULT_DTE);
        let (short, _) = chain.select_contract("SPY", &legs[0], 500.0, at(1)).unwrap();
        let (long, _) = chain.select_contract("SPY", &legs[1], 500.0, at(1)).unwrap();
        assert_eq!(short.strike, 490.0);
        assert_eq!(long.strike, 480.0);
    }

    #[test]
    fn percent_otm_rule() {
        let (_dir, chain) = chain();
        let leg = Leg {
            strike_rule: StrikeRule::PercentOtm(2.0),
            ..long_call(0.3, DEFAULT_DTE)[0].clone()
        };
        // target 502 * 1.02 = 512.04
        let (contract, _) = chain.select_contract("SPY", &leg, 502.0, at(1)).unwrap();
        assert_eq!(contract.strike, 515.0);
        assert_eq!(contract.expiry, NaiveDate::from_ymd_opt(2024, 3, 22).unwrap());
    }

    #[test]
    fn no_expiry_in_window_is_chain_error() {
        let (_dir, chain) = chain();
        let leg = &long_call(
            0.3,
            DteRange {
                min_days: 60,
                max_days: 90,
            },
        )[0];
        let err = chain.select_contract("SPY", leg, 500.0, at(1)).unwrap_err();
        assert!(matches!(err, BtoptError::OptionChain { .. }));
    }

    #[test]
    fn missing_file_is_chain_error() {
        let (_dir, chain) = chain();
        let leg = &long_call(0.3, DEFAULT_DTE)[0];
        assert!(chain.select_contract("QQQ", leg, 400.0, at(1)).is_err());
    }

    #[test]
    fn chain_loaded_once_and_shared() {
        let (dir, chain) = chain();
        let first = chain.load("SPY").unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[&NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()].len(), 6);

        fs::remove_file(dir.path().join("SPY_options.csv")).unwrap();
        let second = chain.load("SPY").unwrap();
        assert!(Rc::ptr_eq(&first, &second));

        let leg = &long_call(0.30, DEFAULT_DTE)[0];
        let (contract, _) = chain.select_contract("SPY", leg, 500.0, at(1)).unwrap();
        assert!(chain.mark(&contract, at(4)).unwrap().is_some());
    }

    #[test]
    fn marks_by_symbol_and_date() {
        let (_dir, chain) = chain();
        let leg = &long_call(0.30, DEFAULT_DTE)[0];
        let (contract, _) = chain.select_contract("SPY", leg, 500.0, at(1)).unwrap();

        let later = chain.mark(&contract, at(4)).unwrap().unwrap();
        assert_eq!(later.mid, 2.0);
        assert_eq!(chain.mark(&contract, at(5)).unwrap(), None);
    }
}
