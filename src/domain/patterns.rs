//! Candle patterns and the market-context key attached to each entry.

use std::fmt;

use crate::domain::bar::Bar;
use crate::domain::series::IndicatorSeries;
use crate::domain::signal::{RSI_OVERBOUGHT, RSI_OVERSOLD};

const HAMMER_BODY_THRESH: f64 = 0.3;
const HAMMER_LOWER_WICK_MULT: f64 = 2.0;
const MIN_RANGE: f64 = 1e-9;
const FLAT_EPSILON: f64 = 1e-9;
const LOW_VOL_ATR_PCT: f64 = 0.01;
const HIGH_VOL_ATR_PCT: f64 = 0.03;

/// Current bullish bar fully engulfs the previous bearish body.
pub fn is_bullish_engulfing(prev: &Bar, bar: &Bar) -> bool {
    bar.close > bar.open
        && prev.close < prev.open
        && bar.close >= prev.open
        && bar.open <= prev.close
}

/// Small body in the bar's range with a long lower wick.
pub fn is_hammer(bar: &Bar, body_thresh: f64, lower_wick_mult: f64) -> bool {
    let range = if bar.range() == 0.0 {
        MIN_RANGE
    } else {
        bar.range()
    };
    let body = bar.body();
    let lower_wick = (bar.open.min(bar.close) - bar.low).abs();
    body / range < body_thresh && lower_wick > lower_wick_mult * body
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candle {
    BullishEngulfing,
    Hammer,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdSign {
    Pos,
    Neg,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsiState {
    Overbought,
    Oversold,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolRegime {
    Low,
    Mid,
    High,
}

impl fmt::Display for Candle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Candle::BullishEngulfing => "bullish_engulfing",
            Candle::Hammer => "hammer",
            Candle::None => "none",
        })
    }
}

impl fmt::Display for MacdSign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MacdSign::Pos => "pos",
            MacdSign::Neg => "neg",
            MacdSign::Flat => "flat",
        })
    }
}

impl fmt::Display for RsiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RsiState::Overbought => "overbought",
            RsiState::Oversold => "oversold",
            RsiState::Neutral => "neutral",
        })
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Flat => "flat",
        })
    }
}

impl fmt::Display for VolRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VolRegime::Low => "low",
            VolRegime::Mid => "mid",
            VolRegime::High => "high",
        })
    }
}

/// `symbol|timeframe|candle|macd_sign|rsi_state|trend|vol_regime`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextKey {
    pub symbol: String,
    pub timeframe: String,
    pub candle: Candle,
    pub macd_sign: MacdSign,
    pub rsi_state: RsiState,
    pub trend: Trend,
    pub vol_regime: VolRegime,
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}|{}",
            self.symbol,
            self.timeframe,
            self.candle,
            self.macd_sign,
            self.rsi_state,
            self.trend,
            self.vol_regime
        )
    }
}

impl ContextKey {
    /// Classify the bar at `index`. Missing indicator values, including those
    /// past the end of a short column, read as neutral.
    pub fn at(series: &IndicatorSeries, index: usize, timeframe: &str) -> Self {
        let bar = &series.bars[index];

        let candle = match index.checked_sub(1).map(|p| &series.bars[p]) {
            Some(prev) if is_bullish_engulfing(prev, bar) => Candle::BullishEngulfing,
            _ if is_hammer(bar, HAMMER_BODY_THRESH, HAMMER_LOWER_WICK_MULT) => Candle::Hammer,
            _ => Candle::None,
        };

        let macd = value_at(&series.macd, index);
        let macd_signal = value_at(&series.macd_signal, index);
        let macd_sign = match (macd, macd_signal) {
            (Some(m), Some(s)) if m - s > FLAT_EPSILON => MacdSign::Pos,
            (Some(m), Some(s)) if s - m > FLAT_EPSILON => MacdSign::Neg,
            _ => MacdSign::Flat,
        };

        let rsi_state = match value_at(&series.rsi, index) {
            Some(r) if r > RSI_OVERBOUGHT => RsiState::Overbought,
            Some(r) if r < RSI_OVERSOLD => RsiState::Oversold,
            _ => RsiState::Neutral,
        };

        let trend = match value_at(&series.ema, index) {
            Some(ema) if bar.close > ema => Trend::Up,
            Some(ema) if bar.close < ema => Trend::Down,
            _ => Trend::Flat,
        };

        let vol_regime = match value_at(&series.atr, index) {
            Some(atr) if atr / bar.close < LOW_VOL_ATR_PCT => VolRegime::Low,
            Some(atr) if atr / bar.close < HIGH_VOL_ATR_PCT => VolRegime::Mid,
            Some(_) => VolRegime::High,
            None => VolRegime::Mid,
        };

        ContextKey {
            symbol: series.symbol.clone(),
            timeframe: timeframe.to_string(),
            candle,
            macd_sign,
            rsi_state,
            trend,
            vol_regime,
        }
    }
}

fn value_at(column: &[Option<f64>], index: usize) -> Option<f64> {
    column.get(index).copied().flatten()
}
