//! Exit decisions for open positions.
//!
//! Options exits compare unrealized P&L with the entry premium. Equity exits
//! compare the close with the entry price. Both check their rules in a fixed
//! priority and return the first that fires.

use std::fmt;

use crate::domain::error::BtoptError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitRules {
    pub profit_target_pct: f64,
    pub max_loss_mult_credit: f64,
    pub time_stop_days_before_expiry: i64,
}

impl ExitRules {
    pub fn validate(&self) -> Result<(), BtoptError> {
        if !(self.profit_target_pct.is_finite() && self.profit_target_pct > 0.0) {
            return Err(BtoptError::invalid(
                "options",
                "profit_target_pct",
                "must be positive",
            ));
        }
        if !(self.max_loss_mult_credit.is_finite() && self.max_loss_mult_credit > 0.0) {
            return Err(BtoptError::invalid(
                "options",
                "max_loss_mult_credit",
                "must be positive",
            ));
        }
        if self.time_stop_days_before_expiry < 0 {
            return Err(BtoptError::invalid(
                "options",
                "time_stop_days",
                "must not be negative",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    ProfitTarget,
    MaxLoss,
    TimeStop,
    TakeProfit,
    StopLoss,
    MaxBars,
    OppositeSignal,
    EndOfData,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::ProfitTarget => "profit_target",
            ExitReason::MaxLoss => "max_loss",
            ExitReason::TimeStop => "time_stop",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::MaxBars => "max_bars",
            ExitReason::OppositeSignal => "opposite_signal",
            ExitReason::EndOfData => "end_of_data",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Hold,
    Close(ExitReason),
}

/// Snapshot of an open options structure. `premium` and `unrealized` must be in
/// the same units (both per share or both whole-position currency).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionsMark {
    pub premium: f64,
    pub is_credit: bool,
    pub unrealized: f64,
    pub days_remaining: i64,
}

pub fn evaluate_options_exit(mark: &OptionsMark, rules: &ExitRules) -> ExitDecision {
    let premium = mark.premium.abs();

    if mark.unrealized >= rules.profit_target_pct * premium {
        return ExitDecision::Close(ExitReason::ProfitTarget);
    }
    if mark.is_credit && -mark.unrealized >= rules.max_loss_mult_credit * premium {
        return ExitDecision::Close(ExitReason::MaxLoss);
    }
    if mark.days_remaining <= rules.time_stop_days_before_expiry {
        return ExitDecision::Close(ExitReason::TimeStop);
    }
    ExitDecision::Hold
}

/// Close-based exits for the equity parameter sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityExitRules {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub max_bars: usize,
}

impl EquityExitRules {
    pub fn evaluate(&self, entry_price: f64, price: f64, bars_held: usize) -> ExitDecision {
        let ret = if entry_price > 0.0 {
            price / entry_price - 1.0
        } else {
            0.0
        };

        if ret >= self.take_profit_pct {
            ExitDecision::Close(ExitReason::TakeProfit)
        } else if ret <= -self.stop_loss_pct {
            ExitDecision::Close(ExitReason::StopLoss)
        } else if bars_held >= self.max_bars {
            ExitDecision::Close(ExitReason::MaxBars)
        } else {
            ExitDecision::Hold
        }
    }
}
