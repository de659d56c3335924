//! RSI threshold-crossing signals confirmed by price versus EMA.
//!
//! A signal fires on the bar where RSI crosses a threshold, not while it stays
//! beyond it: RSI held above 30 for many bars yields a single Buy.

use std::fmt;

use crate::domain::series::IndicatorSeries;

pub const RSI_OVERSOLD: f64 = 30.0;
pub const RSI_OVERBOUGHT: f64 = 70.0;
pub const MIN_SIGNAL_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// Signal for the bar at `index`, using only data up to and including it.
pub fn generate_signal(series: &IndicatorSeries, index: usize) -> Signal {
    if index + 1 < MIN_SIGNAL_SAMPLES || index >= series.len() {
        return Signal::Hold;
    }

    let inputs = (
        series.rsi.get(index - 1).copied().flatten(),
        series.rsi.get(index).copied().flatten(),
        series.close(index),
        series.ema.get(index).copied().flatten(),
    );

    match inputs {
        (Some(prev), Some(now), Some(price), Some(ema)) => crossing_signal(prev, now, price, ema),
        _ => Signal::Hold,
    }
}

/// One signal per bar of the series.
pub fn generate_signals(series: &IndicatorSeries) -> Vec<Signal> {
    (0..series.len())
        .map(|i| generate_signal(series, i))
        .collect()
}

/// Signal for the most recent bar.
pub fn latest_signal(series: &IndicatorSeries) -> Signal {
    match series.len() {
        0 => Signal::Hold,
        n => generate_signal(series, n - 1),
    }
}

fn crossing_signal(prev: f64, now: f64, price: f64, ema: f64) -> Signal {
    if prev <= RSI_OVERSOLD && now > RSI_OVERSOLD && price > ema {
        Signal::Buy
    } else if prev >= RSI_OVERBOUGHT && now < RSI_OVERBOUGHT && price < ema {
        Signal::Sell
    } else {
        Signal::Hold
    }
}
