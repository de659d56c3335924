//! Liquidity-gated fills with half-spread slippage.
//!
//! A fill is priced at `mid ± slip_frac_of_half * spread / 2`: buyers pay above
//! mid, sellers receive below it. Entries must clear the liquidity gates first;
//! exits are never gated so a held position can always be closed.

use std::fmt;

use crate::domain::bar::Bar;

pub const DEFAULT_MAX_SPREAD_PCT: f64 = 0.05;
pub const DEFAULT_MIN_OPEN_INTEREST: u64 = 100;
pub const DEFAULT_MIN_VOLUME: u64 = 20;
pub const DEFAULT_SLIP_FRAC_OF_HALF: f64 = 0.3;
pub const DEFAULT_EQUITY_SPREAD_PCT: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiquidityGates {
    pub max_spread_pct: f64,
    pub min_open_interest: u64,
    pub min_volume: u64,
}

impl Default for LiquidityGates {
    fn default() -> Self {
        LiquidityGates {
            max_spread_pct: DEFAULT_MAX_SPREAD_PCT,
            min_open_interest: DEFAULT_MIN_OPEN_INTEREST,
            min_volume: DEFAULT_MIN_VOLUME,
        }
    }
}

/// A two-sided market snapshot. Open interest is absent for equities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub mid: f64,
    pub spread: f64,
    pub open_interest: Option<u64>,
    pub volume: u64,
}

impl Quote {
    /// Synthetic equity quote: mid at the close, spread as a fraction of it.
    pub fn from_bar(bar: &Bar, spread_pct: f64) -> Self {
        Quote {
            mid: bar.close,
            spread: bar.close * spread_pct,
            open_interest: None,
            volume: bar.volume,
        }
    }

    pub fn spread_pct(&self) -> f64 {
        self.spread / self.mid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    InvalidQuote,
    SpreadTooWide,
    OpenInterestTooLow,
    VolumeTooLow,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InvalidQuote => write!(f, "invalid quote"),
            RejectReason::SpreadTooWide => write!(f, "spread too wide"),
            RejectReason::OpenInterestTooLow => write!(f, "open interest too low"),
            RejectReason::VolumeTooLow => write!(f, "volume too low"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillOutcome {
    /// `slippage` is the per-unit distance from mid, always non-negative.
    Filled { price: f64, slippage: f64 },
    Rejected(RejectReason),
}

impl FillOutcome {
    pub fn is_filled(&self) -> bool {
        matches!(self, FillOutcome::Filled { .. })
    }
}

/// `mid + slip` for buys, `mid - slip` for sells, with `slip = slip_frac * spread / 2`.
pub fn price_with_slippage(mid: f64, spread: f64, side: OrderSide, slip_frac_of_half: f64) -> f64 {
    let slip = slip_frac_of_half * (spread / 2.0);
    match side {
        OrderSide::Buy => mid + slip,
        OrderSide::Sell => mid - slip,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillSimulator {
    pub gates: LiquidityGates,
    pub slip_frac_of_half: f64,
}

impl Default for FillSimulator {
    fn default() -> Self {
        FillSimulator {
            gates: LiquidityGates::default(),
            slip_frac_of_half: DEFAULT_SLIP_FRAC_OF_HALF,
        }
    }
}

impl FillSimulator {
    pub fn new(gates: LiquidityGates, slip_frac_of_half: f64) -> Self {
        FillSimulator {
            gates,
            slip_frac_of_half,
        }
    }

    /// First gate the quote fails, if any. A spread exactly at the limit passes.
    pub fn check_gates(&self, quote: &Quote) -> Option<RejectReason> {
        if !quote.mid.is_finite()
            || quote.mid <= 0.0
            || !quote.spread.is_finite()
            || quote.spread < 0.0
        {
            return Some(RejectReason::InvalidQuote);
        }
        if quote.spread_pct() > self.gates.max_spread_pct {
            return Some(RejectReason::SpreadTooWide);
        }
        if let Some(oi) = quote.open_interest
            && oi < self.gates.min_open_interest
        {
            return Some(RejectReason::OpenInterestTooLow);
        }
        if quote.volume < self.gates.min_volume {
            return Some(RejectReason::VolumeTooLow);
        }
        None
    }

    /// Gated entry fill.
    pub fn fill(&self, quote: &Quote, side: OrderSide) -> FillOutcome {
        match self.check_gates(quote) {
            Some(reason) => FillOutcome::Rejected(reason),
            None => self.priced(quote, side),
        }
    }

    /// Ungated exit fill; only an unusable quote is rejected.
    pub fn exit_fill(&self, quote: &Quote, side: OrderSide) -> FillOutcome {
        if !quote.mid.is_finite() || quote.mid <= 0.0 {
            return FillOutcome::Rejected(RejectReason::InvalidQuote);
        }
        self.priced(quote, side)
    }

    fn priced(&self, quote: &Quote, side: OrderSide) -> FillOutcome {
        let spread = quote.spread.max(0.0);
        let price = price_with_slippage(quote.mid, spread, side, self.slip_frac_of_half);
        FillOutcome::Filled {
            price,
            slippage: (price - quote.mid).abs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quote(mid: f64, spread: f64, oi: Option<u64>, volume: u64) -> Quote {
        Quote {
            mid,
            spread,
            open_interest: oi,
            volume,
        }
    }

    #[test]
    fn buy_pays_above_mid() {
        let sim = FillSimulator::default();
        let outcome = sim.fill(&quote(2.0, 0.04, Some(500), 100), OrderSide::Buy);
        match outcome {
            FillOutcome::Filled { price, slippage } => {
                assert_relative_eq!(price, 2.006, epsilon = 1e-12);
                assert_relative_eq!(slippage, 0.006, epsilon = 1e-12);
            }
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[test]
    fn sell_receives_below_mid() {
        let price = price_with_slippage(2.0, 0.04, OrderSide::Sell, 0.3);
        assert_relative_eq!(price, 1.994, epsilon = 1e-12);
    }

    #[test]
    fn zero_spread_fills_at_mid() {
        assert_relative_eq!(price_with_slippage(10.0, 0.0, OrderSide::Buy, 0.3), 10.0);
        assert_relative_eq!(price_with_slippage(10.0, 0.0, OrderSide::Sell, 0.3), 10.0);
    }

    #[test]
    fn six_percent_spread_rejected() {
        let sim = FillSimulator::default();
        let outcome = sim.fill(&quote(1.0, 0.06, Some(500), 100), OrderSide::Buy);
        assert_eq!(outcome, FillOutcome::Rejected(RejectReason::SpreadTooWide));
    }

    #[test]
    fn spread_at_limit_passes() {
        let sim = FillSimulator::default();
        let outcome = sim.fill(&quote(2.0, 0.1, Some(500), 100), OrderSide::Buy);
        assert!(outcome.is_filled());
    }

    #[test]
    fn low_open_interest_rejected() {
        let sim = FillSimulator::default();
        let outcome = sim.fill(&quote(2.0, 0.02, Some(99), 100), OrderSide::Buy);
        assert_eq!(outcome, FillOutcome::Rejected(RejectReason::OpenInterestTooLow));
    }

    #[test]
    fn missing_open_interest_skips_gate() {
        let sim = FillSimulator::default();
        assert!(sim.fill(&quote(2.0, 0.02, None, 100), OrderSide::Buy).is_filled());
    }

    #[test]
    fn low_volume_rejected() {
        let sim = FillSimulator::default();
        let outcome = sim.fill(&quote(2.0, 0.02, Some(500), 19), OrderSide::Sell);
        assert_eq!(outcome, FillOutcome::Rejected(RejectReason::VolumeTooLow));
    }

    #[test]
    fn non_positive_mid_rejected() {
        let sim = FillSimulator::default();
        let outcome = sim.fill(&quote(0.0, 0.02, Some(500), 100), OrderSide::Buy);
        assert_eq!(outcome, FillOutcome::Rejected(RejectReason::InvalidQuote));
    }

    #[test]
    fn exit_fill_ignores_gates() {
        let sim = FillSimulator::default();
        let outcome = sim.exit_fill(&quote(1.0, 0.5, Some(0), 0), OrderSide::Sell);
        match outcome {
            FillOutcome::Filled { price, .. } => assert_relative_eq!(price, 0.925, epsilon = 1e-12),
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[test]
    fn equity_quote_from_bar() {
        let bar = Bar {
            timestamp: chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            open: 99.0,
            high: 101.0,
            low: 98.0,
            close: 100.0,
            volume: 5_000,
        };
        let q = Quote::from_bar(&bar, 0.001);
        assert_relative_eq!(q.mid, 100.0);
        assert_relative_eq!(q.spread, 0.1, epsilon = 1e-12);
        assert_eq!(q.open_interest, None);
        assert_eq!(q.volume, 5_000);
    }
}
