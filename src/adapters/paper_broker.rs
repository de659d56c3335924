//! In-memory broker and asset catalog for paper trading and tests.

use std::cell::RefCell;

use crate::domain::error::BtoptError;
use crate::ports::broker_port::{
    Asset, BrokerError, BrokerPort, OrderAck, OrderRequest, UniverseCatalogPort,
};

#[derive(Default)]
pub struct PaperBroker {
    assets: Vec<Asset>,
    orders: RefCell<Vec<OrderAck>>,
}

impl PaperBroker {
    pub fn new(assets: Vec<Asset>) -> Self {
        Self {
            assets,
            orders: RefCell::new(Vec::new()),
        }
    }

    /// Catalog of active, tradable assets named by `symbols`.
    pub fn with_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            symbols
                .into_iter()
                .map(|s| Asset {
                    symbol: s.into(),
                    active: true,
                    tradable: true,
                })
                .collect(),
        )
    }

    pub fn orders(&self) -> Vec<OrderAck> {
        self.orders.borrow().clone()
    }
}

impl BrokerPort for PaperBroker {
    fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
        if order.quantity == 0 {
            return Err(BrokerError::Rejected {
                symbol: order.symbol.clone(),
                reason: "quantity must be positive".into(),
            });
        }
        if let Some(asset) = self.assets.iter().find(|a| a.symbol == order.symbol)
            && !asset.tradable
        {
            return Err(BrokerError::Rejected {
                symbol: order.symbol.clone(),
                reason: "asset not tradable".into(),
            });
        }

        let mut orders = self.orders.borrow_mut();
        let ack = OrderAck {
            order_id: format!("paper-{}", orders.len() + 1),
            request: order.clone(),
        };
        orders.push(ack.clone());
        Ok(ack)
    }
}

impl UniverseCatalogPort for PaperBroker {
    fn list_assets(&self, active_only: bool) -> Result<Vec<Asset>, BtoptError> {
        Ok(self
            .assets
            .iter()
            .filter(|a| !active_only || (a.active && a.tradable))
            .cloned()
            .collect())
    }
}
