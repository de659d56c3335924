//! Option-chain lookup port trait.

use chrono::NaiveDateTime;

use crate::domain::error::BtoptError;
use crate::domain::fill::Quote;
use crate::domain::position::OptionContract;
use crate::domain::strategy::Leg;

pub trait OptionChainPort {
    /// Resolve a leg's strike rule and DTE window to a listed contract and its
    /// quote at `as_of`. `underlying_price` is the spot used for strike selection.
    fn select_contract(
        &self,
        underlying: &str,
        leg: &Leg,
        underlying_price: f64,
        as_of: NaiveDateTime,
    ) -> Result<(OptionContract, Quote), BtoptError>;

    /// Quote for an already selected contract. `Ok(None)` when no mark exists.
    fn mark(
        &self,
        contract: &OptionContract,
        as_of: NaiveDateTime,
    ) -> Result<Option<Quote>, BtoptError>;
}
