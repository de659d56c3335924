//! Options strategy templates and their leg structure.
//!
//! Templates only describe legs. Resolving a strike rule and DTE range to a
//! concrete contract is the option chain's job.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::BtoptError;
use crate::domain::signal::Signal;

pub const DEFAULT_SHORT_DELTA: f64 = 0.30;
pub const DEFAULT_LONG_WING_DELTA: f64 = 0.15;
pub const DEFAULT_ATM_DELTA: f64 = 0.50;
pub const DEFAULT_DTE: DteRange = DteRange {
    min_days: 20,
    max_days: 30,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionType {
    Call,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegSide {
    Long,
    Short,
}

impl LegSide {
    /// +1 for long legs, -1 for short legs.
    pub fn sign(&self) -> f64 {
        match self {
            LegSide::Long => 1.0,
            LegSide::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrikeRule {
    Delta(f64),
    PercentOtm(f64),
}

/// Inclusive days-to-expiry window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DteRange {
    pub min_days: u32,
    pub max_days: u32,
}

impl DteRange {
    pub fn contains(&self, days: u32) -> bool {
        (self.min_days..=self.max_days).contains(&days)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub option_type: OptionType,
    pub side: LegSide,
    pub strike_rule: StrikeRule,
    pub dte: DteRange,
    pub quantity: u32,
}

impl Leg {
    fn new(option_type: OptionType, side: LegSide, strike_rule: StrikeRule, dte: DteRange) -> Self {
        Leg {
            option_type,
            side,
            strike_rule,
            dte,
            quantity: 1,
        }
    }
}

pub fn long_call(delta: f64, dte: DteRange) -> Vec<Leg> {
    vec![Leg::new(OptionType::Call, LegSide::Long, StrikeRule::Delta(delta), dte)]
}

pub fn long_put(delta: f64, dte: DteRange) -> Vec<Leg> {
    vec![Leg::new(OptionType::Put, LegSide::Long, StrikeRule::Delta(delta), dte)]
}

/// Short put at `short_delta`, protective long put at `long_delta`.
pub fn vertical_credit_bull_put(short_delta: f64, long_delta: f64, dte: DteRange) -> Vec<Leg> {
    vec![
        Leg::new(OptionType::Put, LegSide::Short, StrikeRule::Delta(short_delta), dte),
        Leg::new(OptionType::Put, LegSide::Long, StrikeRule::Delta(long_delta), dte),
    ]
}

pub fn straddle(atm_rule: StrikeRule, dte: DteRange) -> Vec<Leg> {
    vec![
        Leg::new(OptionType::Call, LegSide::Long, atm_rule, dte),
        Leg::new(OptionType::Put, LegSide::Long, atm_rule, dte),
    ]
}

/// Short call, long call, short put, long put.
pub fn iron_condor(
    call_short: f64,
    call_long: f64,
    put_short: f64,
    put_long: f64,
    dte: DteRange,
) -> Vec<Leg> {
    vec![
        Leg::new(OptionType::Call, LegSide::Short, StrikeRule::Delta(call_short), dte),
        Leg::new(OptionType::Call, LegSide::Long, StrikeRule::Delta(call_long), dte),
        Leg::new(OptionType::Put, LegSide::Short, StrikeRule::Delta(put_short), dte),
        Leg::new(OptionType::Put, LegSide::Long, StrikeRule::Delta(put_long), dte),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    LongCall,
    LongPut,
    VerticalCreditBullPut,
    Straddle,
    IronCondor,
}

impl TemplateKind {
    pub fn name(&self) -> &'static str {
        match self {
            TemplateKind::LongCall => "long_call",
            TemplateKind::LongPut => "long_put",
            TemplateKind::VerticalCreditBullPut => "vertical_credit_bull_put",
            TemplateKind::Straddle => "straddle",
            TemplateKind::IronCondor => "iron_condor",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long_call" => Ok(TemplateKind::LongCall),
            "long_put" => Ok(TemplateKind::LongPut),
            "vertical_credit_bull_put" | "bull_put" => Ok(TemplateKind::VerticalCreditBullPut),
            "straddle" => Ok(TemplateKind::Straddle),
            "iron_condor" => Ok(TemplateKind::IronCondor),
            other => Err(format!("unknown template '{other}'")),
        }
    }
}

/// A fully parameterized template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemplateSpec {
    LongCall {
        delta: f64,
        dte: DteRange,
    },
    LongPut {
        delta: f64,
        dte: DteRange,
    },
    VerticalCreditBullPut {
        short_delta: f64,
        long_delta: f64,
        dte: DteRange,
    },
    Straddle {
        atm_rule: StrikeRule,
        dte: DteRange,
    },
    IronCondor {
        call_short: f64,
        call_long: f64,
        put_short: f64,
        put_long: f64,
        dte: DteRange,
    },
}

impl TemplateSpec {
    /// The template with its default deltas and DTE window.
    pub fn with_defaults(kind: TemplateKind) -> Self {
        let dte = DEFAULT_DTE;
        match kind {
            TemplateKind::LongCall => TemplateSpec::LongCall {
                delta: DEFAULT_SHORT_DELTA,
                dte,
            },
            TemplateKind::LongPut => TemplateSpec::LongPut {
                delta: DEFAULT_SHORT_DELTA,
                dte,
            },
            TemplateKind::VerticalCreditBullPut => TemplateSpec::VerticalCreditBullPut {
                short_delta: DEFAULT_SHORT_DELTA,
                long_delta: DEFAULT_LONG_WING_DELTA,
                dte,
            },
            TemplateKind::Straddle => TemplateSpec::Straddle {
                atm_rule: StrikeRule::Delta(DEFAULT_ATM_DELTA),
                dte,
            },
            TemplateKind::IronCondor => TemplateSpec::IronCondor {
                call_short: DEFAULT_SHORT_DELTA,
                call_long: DEFAULT_LONG_WING_DELTA,
                put_short: DEFAULT_SHORT_DELTA,
                put_long: DEFAULT_LONG_WING_DELTA,
                dte,
            },
        }
    }

    pub fn kind(&self) -> TemplateKind {
        match self {
            TemplateSpec::LongCall { .. } => TemplateKind::LongCall,
            TemplateSpec::LongPut { .. } => TemplateKind::LongPut,
            TemplateSpec::VerticalCreditBullPut { .. } => TemplateKind::VerticalCreditBullPut,
            TemplateSpec::Straddle { .. } => TemplateKind::Straddle,
            TemplateSpec::IronCondor { .. } => TemplateKind::IronCondor,
        }
    }

    pub fn dte(&self) -> DteRange {
        match *self {
            TemplateSpec::LongCall { dte, .. }
            | TemplateSpec::LongPut { dte, .. }
            | TemplateSpec::VerticalCreditBullPut { dte, .. }
            | TemplateSpec::Straddle { dte, .. }
            | TemplateSpec::IronCondor { dte, .. } => dte,
        }
    }

    /// Reject deltas outside (0, 1), wings at or beyond their short strike, and
    /// inverted DTE windows.
    pub fn validate(&self) -> Result<(), BtoptError> {
        let dte = self.dte();
        if dte.min_days > dte.max_days {
            return Err(BtoptError::invalid(
                "options",
                "dte_min",
                format!("dte_min {} exceeds dte_max {}", dte.min_days, dte.max_days),
            ));
        }

        match *self {
            TemplateSpec::LongCall { delta, .. } | TemplateSpec::LongPut { delta, .. } => {
                check_delta("delta", delta)
            }
            TemplateSpec::VerticalCreditBullPut {
                short_delta,
                long_delta,
                ..
            } => {
                check_delta("short_delta", short_delta)?;
                check_delta("long_delta", long_delta)?;
                check_wing("long_delta", short_delta, long_delta)
            }
            TemplateSpec::Straddle { atm_rule, .. } => match atm_rule {
                StrikeRule::Delta(d) => check_delta("atm_delta", d),
                StrikeRule::PercentOtm(p) if p.is_finite() && p >= 0.0 => Ok(()),
                StrikeRule::PercentOtm(p) => Err(BtoptError::invalid(
                    "options",
                    "atm_pct_otm",
                    format!("{p} is not a valid percent out of the money"),
                )),
            },
            TemplateSpec::IronCondor {
                call_short,
                call_long,
                put_short,
                put_long,
                ..
            } => {
                check_delta("call_short", call_short)?;
                check_delta("call_long", call_long)?;
                check_delta("put_short", put_short)?;
                check_delta("put_long", put_long)?;
                check_wing("call_long", call_short, call_long)?;
                check_wing("put_long", put_short, put_long)
            }
        }
    }

    pub fn legs(&self) -> Vec<Leg> {
        match *self {
            TemplateSpec::LongCall { delta, dte } => long_call(delta, dte),
            TemplateSpec::LongPut { delta, dte } => long_put(delta, dte),
            TemplateSpec::VerticalCreditBullPut {
                short_delta,
                long_delta,
                dte,
            } => vertical_credit_bull_put(short_delta, long_delta, dte),
            TemplateSpec::Straddle { atm_rule, dte } => straddle(atm_rule, dte),
            TemplateSpec::IronCondor {
                call_short,
                call_long,
                put_short,
                put_long,
                dte,
            } => iron_condor(call_short, call_long, put_short, put_long, dte),
        }
    }

    pub fn build(&self) -> StrategyTemplate {
        StrategyTemplate {
            kind: self.kind(),
            legs: self.legs(),
        }
    }

    /// Whether `signal` opens this template.
    pub fn enters_on(&self, signal: Signal) -> bool {
        match (self.kind(), signal) {
            (_, Signal::Hold) => false,
            (TemplateKind::LongCall | TemplateKind::VerticalCreditBullPut, s) => s == Signal::Buy,
            (TemplateKind::LongPut, s) => s == Signal::Sell,
            (TemplateKind::Straddle | TemplateKind::IronCondor, _) => true,
        }
    }
}

fn check_delta(key: &str, delta: f64) -> Result<(), BtoptError> {
    if delta.is_finite() && delta > 0.0 && delta < 1.0 {
        Ok(())
    } else {
        Err(BtoptError::invalid(
            "options",
            key,
            format!("delta {delta} must be in (0, 1)"),
        ))
    }
}

fn check_wing(key: &str, short: f64, long: f64) -> Result<(), BtoptError> {
    if long < short {
        Ok(())
    } else {
        Err(BtoptError::invalid(
            "options",
            key,
            format!("wing delta {long} must be below short delta {short}"),
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyTemplate {
    pub kind: TemplateKind,
    pub legs: Vec<Leg>,
}
