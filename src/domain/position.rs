//! Open positions and closed trades.
//!
//! Values are signed from the holder's view: long equity and long option legs
//! carry positive value, short legs negative. A credit structure therefore
//! opens with a negative `entry_value`.

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::exits::ExitReason;
use crate::domain::strategy::{Leg, OptionType, TemplateKind};

pub type PositionId = u64;

/// Shares per listed equity option contract.
pub const CONTRACT_MULTIPLIER: f64 = 100.0;

#[derive(Debug, Clone, PartialEq)]
pub struct OptionContract {
    pub contract_symbol: String,
    pub underlying: String,
    pub option_type: OptionType,
    pub strike: f64,
    pub expiry: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilledLeg {
    pub leg: Leg,
    pub contract: OptionContract,
    /// Per-share fill price, always positive.
    pub fill_price: f64,
}

impl FilledLeg {
    /// Signed per-share value of this leg at `price`.
    pub fn signed_value(&self, price: f64) -> f64 {
        self.leg.side.sign() * price * self.leg.quantity as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionKind {
    Equity,
    Options {
        template: TemplateKind,
        legs: Vec<FilledLeg>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub kind: PositionKind,
    pub quantity: u64,
    pub entry_time: NaiveDateTime,
    pub entry_index: usize,
    /// Signed value paid (positive) or received (negative) at entry.
    pub entry_value: f64,
    /// Per-unit entry price: share price for equity, net premium per share for options.
    pub entry_price: f64,
    /// Collateral held against a credit structure; zero otherwise.
    pub reserve: f64,
    pub risk_capital: f64,
    pub entry_fees: f64,
    pub entry_slippage: f64,
    pub context: String,
    pub mae: f64,
    pub mfe: f64,
}

impl Position {
    /// Cash required to open: entry value plus reserve plus fees.
    pub fn opening_outlay(&self) -> f64 {
        self.entry_value + self.reserve + self.entry_fees
    }

    pub fn is_credit(&self) -> bool {
        self.entry_value < 0.0
    }

    pub fn is_options(&self) -> bool {
        matches!(self.kind, PositionKind::Options { .. })
    }

    pub fn strategy_name(&self) -> &'static str {
        match &self.kind {
            PositionKind::Equity => "equity",
            PositionKind::Options { template, .. } => template.name(),
        }
    }

    pub fn unrealized(&self, current_value: f64) -> f64 {
        current_value - self.entry_value
    }

    /// Nearest expiry across legs; `None` for equity.
    pub fn expiry(&self) -> Option<NaiveDate> {
        match &self.kind {
            PositionKind::Equity => None,
            PositionKind::Options { legs, .. } => legs.iter().map(|l| l.contract.expiry).min(),
        }
    }

    /// Widen the excursion range with an interval of unrealized P&L.
    pub fn record_excursion(&mut self, low_unrealized: f64, high_unrealized: f64) {
        self.mae = self.mae.min(low_unrealized).min(0.0);
        self.mfe = self.mfe.max(high_unrealized).max(0.0);
    }
}

/// Exit execution details supplied when closing a position.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitFill {
    pub time: NaiveDateTime,
    pub index: usize,
    /// Signed value of the position at exit, same convention as `entry_value`.
    pub value: f64,
    pub price: f64,
    pub fees: f64,
    pub slippage: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: PositionId,
    pub position: Position,
    pub exit_time: NaiveDateTime,
    pub exit_index: usize,
    pub exit_value: f64,
    pub exit_price: f64,
    pub exit_fees: f64,
    pub exit_slippage: f64,
    pub exit_reason: ExitReason,
}

impl Trade {
    pub fn from_exit(id: PositionId, position: Position, exit: ExitFill) -> Self {
        Trade {
            id,
            position,
            exit_time: exit.time,
            exit_index: exit.index,
            exit_value: exit.value,
            exit_price: exit.price,
            exit_fees: exit.fees,
            exit_slippage: exit.slippage,
            exit_reason: exit.reason,
        }
    }

    pub fn fees(&self) -> f64 {
        self.position.entry_fees + self.exit_fees
    }

    pub fn slippage_cost(&self) -> f64 {
        self.position.entry_slippage + self.exit_slippage
    }

    pub fn pnl(&self) -> f64 {
        self.exit_value - self.position.entry_value - self.fees()
    }

    pub fn bars_held(&self) -> usize {
        self.exit_index.saturating_sub(self.position.entry_index)
    }
}
