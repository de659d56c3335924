//! Price-history retrieval port trait.

use crate::domain::bar::Bar;
use crate::domain::error::BtoptError;
use crate::domain::series::IndicatorSeries;

pub trait DataPort {
    /// Bars with their aligned indicator columns over the last `lookback_days`.
    ///
    /// Retryable failures are reported as `BtoptError::TransientFetch`.
    fn fetch_series(
        &self,
        symbol: &str,
        timeframe: &str,
        lookback_days: u32,
    ) -> Result<IndicatorSeries, BtoptError>;

    /// Plain bars, used for universe ranking.
    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        lookback_days: u32,
    ) -> Result<Vec<Bar>, BtoptError> {
        self.fetch_series(symbol, timeframe, lookback_days)
            .map(|s| s.bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, BtoptError>;
}
