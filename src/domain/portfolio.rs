//! Cash and open-position bookkeeping.
//!
//! Opening debits the signed entry value, any collateral reserve and entry
//! fees. Closing credits the signed exit value plus the released reserve, less
//! exit fees. Every check runs before any mutation.

use std::collections::HashMap;

use super::position::{ExitFill, Position, PositionId, Trade};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortfolioError {
    #[error("portfolio already holds the maximum of {max} positions")]
    CapacityExceeded { max: usize },

    #[error("insufficient cash: need {required:.2}, have {available:.2}")]
    InsufficientCash { required: f64, available: f64 },

    #[error("no open position with id {0}")]
    UnknownPosition(PositionId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub id: PositionId,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub max_positions: usize,
    holdings: Vec<Holding>,
    next_id: PositionId,
}

impl Portfolio {
    pub fn new(initial_capital: f64, max_positions: usize) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            max_positions,
            holdings: Vec::new(),
            next_id: 1,
        }
    }

    pub fn open_position(&mut self, position: Position) -> Result<PositionId, PortfolioError> {
        if self.holdings.len() >= self.max_positions {
            return Err(PortfolioError::CapacityExceeded {
                max: self.max_positions,
            });
        }
        let required = position.opening_outlay();
        if required > self.cash {
            return Err(PortfolioError::InsufficientCash {
                required,
                available: self.cash,
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        self.cash -= required;
        self.holdings.push(Holding { id, position });
        Ok(id)
    }

    pub fn close_position(
        &mut self,
        id: PositionId,
        exit: ExitFill,
    ) -> Result<Trade, PortfolioError> {
        let idx = self
            .holdings
            .iter()
            .position(|h| h.id == id)
            .ok_or(PortfolioError::UnknownPosition(id))?;

        let Holding { id, position } = self.holdings.remove(idx);
        self.cash += exit.value + position.reserve - exit.fees;
        Ok(Trade::from_exit(id, position, exit))
    }

    /// Record the unrealized P&L range seen since the last mark.
    pub fn mark(
        &mut self,
        id: PositionId,
        low_unrealized: f64,
        high_unrealized: f64,
    ) -> Result<(), PortfolioError> {
        let holding = self
            .holdings
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or(PortfolioError::UnknownPosition(id))?;
        holding
            .position
            .record_excursion(low_unrealized, high_unrealized);
        Ok(())
    }

    pub fn get_position(&self, id: PositionId) -> Option<&Position> {
        self.holdings
            .iter()
            .find(|h| h.id == id)
            .map(|h| &h.position)
    }

    /// Open positions in the order they were opened.
    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn position_count(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_full(&self) -> bool {
        self.holdings.len() >= self.max_positions
    }

    /// Cash plus each position's reserve and current value. Positions without a
    /// mark are carried at their entry value.
    pub fn equity(&self, marks: &HashMap<PositionId, f64>) -> f64 {
        let book: f64 = self
            .holdings
            .iter()
            .map(|h| {
                let value = marks
                    .get(&h.id)
                    .copied()
                    .unwrap_or(h.position.entry_value);
                value + h.position.reserve
            })
            .sum();
        self.cash + book
    }
}
