//! Per-symbol bars aligned with their derived indicator series.
//!
//! Indicator values are produced upstream; this type only enforces that every
//! derived series lines up with the bars and that bars are strictly time-ordered.
//! `None` marks warm-up positions where an indicator has no value yet.

use crate::domain::bar::Bar;
use crate::domain::error::BtoptError;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub symbol: String,
    pub bars: Vec<Bar>,
    pub rsi: Vec<Option<f64>>,
    pub ema: Vec<Option<f64>>,
    pub macd: Vec<Option<f64>>,
    pub macd_signal: Vec<Option<f64>>,
    pub atr: Vec<Option<f64>>,
}

impl IndicatorSeries {
    /// Build a series with every indicator absent; fill columns with the `with_*` methods.
    pub fn from_bars(symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        let n = bars.len();
        Self {
            symbol: symbol.into(),
            bars,
            rsi: vec![None; n],
            ema: vec![None; n],
            macd: vec![None; n],
            macd_signal: vec![None; n],
            atr: vec![None; n],
        }
    }

    pub fn with_rsi(mut self, rsi: Vec<Option<f64>>) -> Self {
        self.rsi = rsi;
        self
    }

    pub fn with_ema(mut self, ema: Vec<Option<f64>>) -> Self {
        self.ema = ema;
        self
    }

    pub fn with_macd(mut self, macd: Vec<Option<f64>>, signal: Vec<Option<f64>>) -> Self {
        self.macd = macd;
        self.macd_signal = signal;
        self
    }

    pub fn with_atr(mut self, atr: Vec<Option<f64>>) -> Self {
        self.atr = atr;
        self
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn close(&self, index: usize) -> Option<f64> {
        self.bars.get(index).map(|b| b.close)
    }

    /// Check alignment and ordering. Any violation means the history is unusable.
    pub fn validate(&self) -> Result<(), BtoptError> {
        if self.bars.is_empty() {
            return Err(self.unavailable("history is empty".to_string()));
        }

        let n = self.bars.len();
        let columns = [
            ("rsi", self.rsi.len()),
            ("ema", self.ema.len()),
            ("macd", self.macd.len()),
            ("macd_signal", self.macd_signal.len()),
            ("atr", self.atr.len()),
        ];
        for (name, len) in columns {
            if len != n {
                return Err(self.unavailable(format!(
                    "{} has {} values for {} bars",
                    name, len, n
                )));
            }
        }

        if let Some(w) = self
            .bars
            .windows(2)
            .find(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(self.unavailable(format!(
                "bars not strictly increasing at {}",
                w[1].timestamp
            )));
        }

        if let Some(bar) = self
            .bars
            .iter()
            .find(|b| !b.close.is_finite() || b.close <= 0.0)
        {
            return Err(self.unavailable(format!(
                "non-positive close at {}",
                bar.timestamp
            )));
        }

        Ok(())
    }

    fn unavailable(&self, reason: String) -> BtoptError {
        BtoptError::DataUnavailable {
            symbol: self.symbol.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(minute: u32, close: f64) -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(10, minute, 0)
                .unwrap(),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn valid_series_passes() {
        let series = IndicatorSeries::from_bars("SPY", vec![bar(0, 100.0), bar(5, 101.0)])
            .with_rsi(vec![None, Some(45.0)]);
        assert!(series.validate().is_ok());
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn empty_series_is_unavailable() {
        let series = IndicatorSeries::from_bars("SPY", vec![]);
        let err = series.validate().unwrap_err();
        assert!(matches!(err, BtoptError::DataUnavailable { symbol, .. } if symbol == "SPY"));
    }

    #[test]
    fn misaligned_indicator_is_unavailable() {
        let series = IndicatorSeries::from_bars("SPY", vec![bar(0, 100.0), bar(5, 101.0)])
            .with_ema(vec![Some(100.0)]);
        let err = series.validate().unwrap_err();
        assert!(err.to_string().contains("ema has 1 values for 2 bars"));
    }

    #[test]
    fn out_of_order_bars_are_unavailable() {
        let series = IndicatorSeries::from_bars("SPY", vec![bar(5, 100.0), bar(0, 101.0)]);
        assert!(series.validate().is_err());
    }

    #[test]
    fn duplicate_timestamps_are_unavailable() {
        let series = IndicatorSeries::from_bars("SPY", vec![bar(5, 100.0), bar(5, 101.0)]);
        assert!(series.validate().is_err());
    }

    #[test]
    fn zero_close_is_unavailable() {
        let series = IndicatorSeries::from_bars("SPY", vec![bar(0, 100.0), bar(5, 0.0)]);
        assert!(series.validate().is_err());
    }
}
