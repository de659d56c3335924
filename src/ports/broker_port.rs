//! Live-service collaborator ports: universe catalog and order submission.

use crate::domain::error::BtoptError;
use crate::domain::fill::OrderSide;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BrokerError {
    #[error("order for {symbol} rejected: {reason}")]
    Rejected { symbol: String, reason: String },

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub request: OrderRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub symbol: String,
    pub active: bool,
    pub tradable: bool,
}

pub trait BrokerPort {
    fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError>;
}

pub trait UniverseCatalogPort {
    /// Listed assets. `active_only` is forwarded as-is; filtering is the
    /// catalog's responsibility.
    fn list_assets(&self, active_only: bool) -> Result<Vec<Asset>, BtoptError>;
}
