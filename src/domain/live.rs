//! One live cycle: latest signal per symbol turned into sized orders.

use tracing::{info, warn};

use crate::domain::fill::OrderSide;
use crate::domain::series::IndicatorSeries;
use crate::domain::signal::{latest_signal, Signal};
use crate::domain::sizing::calc_qty;
use crate::ports::broker_port::{BrokerError, BrokerPort, OrderAck, OrderRequest};

#[derive(Debug, Clone, PartialEq)]
pub struct SizedOrder {
    pub request: OrderRequest,
    pub signal: Signal,
    pub price: f64,
}

#[derive(Debug, Default)]
pub struct LiveCycleReport {
    pub planned: Vec<SizedOrder>,
    pub submitted: Vec<OrderAck>,
    pub failed: Vec<(String, BrokerError)>,
}

/// Orders for every series whose latest bar carries a Buy or Sell signal.
pub fn plan_live_orders(
    series: &[IndicatorSeries],
    paper_equity: f64,
    risk_pct: f64,
) -> Vec<SizedOrder> {
    series
        .iter()
        .filter_map(|s| {
            let signal = latest_signal(s);
            let side = match signal {
                Signal::Buy => OrderSide::Buy,
                Signal::Sell => OrderSide::Sell,
                Signal::Hold => return None,
            };
            let price = s.bars.last()?.close;
            let quantity = calc_qty(price, paper_equity, risk_pct);
            if quantity == 0 {
                warn!(symbol = %s.symbol, price, "sized to zero, skipping");
                return None;
            }
            Some(SizedOrder {
                request: OrderRequest {
                    symbol: s.symbol.clone(),
                    side,
                    quantity,
                },
                signal,
                price,
            })
        })
        .collect()
}

/// Plan orders and, when `place_orders` is set, submit each one. A rejected
/// submission is recorded against its symbol and the cycle continues.
pub fn run_live_cycle(
    series: &[IndicatorSeries],
    paper_equity: f64,
    risk_pct: f64,
    place_orders: bool,
    broker: Option<&dyn BrokerPort>,
) -> LiveCycleReport {
    let planned = plan_live_orders(series, paper_equity, risk_pct);
    let mut report = LiveCycleReport::default();

    match broker {
        Some(broker) if place_orders => {
            for order in &planned {
                match broker.submit_order(&order.request) {
                    Ok(ack) => {
                        info!(
                            symbol = %order.request.symbol,
                            side = %order.request.side,
                            qty = order.request.quantity,
                            id = %ack.order_id,
                            "order accepted"
                        );
                        report.submitted.push(ack);
                    }
                    Err(e) => {
                        warn!(symbol = %order.request.symbol, error = %e, "order failed");
                        report.failed.push((order.request.symbol.clone(), e));
                    }
                }
            }
        }
        _ => info!(orders = planned.len(), "order placement disabled"),
    }

    report.planned = planned;
    report
}
