//! Order executor.
//!
//! Turns one internal order into exactly one immediate-execution broker
//! command. Placement runs on a task of its own so the evaluation loop never
//! waits on the broker; the outcome comes back as a message in the manager's
//! mailbox, which preserves per-trade serialization.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::broker::{BrokerAdapter, OrderTicket};
use crate::domain::{BrokerOrderId, OrderId};

use super::manager::EngineCommand;

/// Outcome of an asynchronous order placement.
#[derive(Debug, Clone)]
pub enum ExecutionReport {
    /// The broker acknowledged the order.
    Submitted {
        /// Engine order id.
        order_id: OrderId,
        /// Broker-assigned id.
        broker_order_id: BrokerOrderId,
    },
    /// The broker refused the order.
    Rejected {
        /// Engine order id.
        order_id: OrderId,
        /// Refusal reason.
        reason: String,
    },
}

/// Submits orders and routes broker confirmations back into the engine.
#[derive(Clone)]
pub struct OrderExecutor {
    broker: Arc<dyn BrokerAdapter>,
    mailbox: mpsc::Sender<EngineCommand>,
}

impl OrderExecutor {
    /// Create an executor reporting into `mailbox`.
    pub fn new(broker: Arc<dyn BrokerAdapter>, mailbox: mpsc::Sender<EngineCommand>) -> Self {
        Self { broker, mailbox }
    }

    /// Transmit one order. Returns immediately; the result arrives later as
    /// an [`ExecutionReport`] message.
    pub fn submit(&self, ticket: OrderTicket) {
        let broker = Arc::clone(&self.broker);
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            let order_id = ticket.order_id.clone();
            info!(order_id = %order_id, symbol = %ticket.symbol, qty = %ticket.quantity, "transmitting order");

            let report = match broker.place_order(&ticket).await {
                Ok(broker_order_id) => ExecutionReport::Submitted {
                    order_id,
                    broker_order_id,
                },
                Err(err) => ExecutionReport::Rejected {
                    order_id,
                    reason: err.to_string(),
                },
            };

            if mailbox
                .send(EngineCommand::ExecutorReport(report))
                .await
                .is_err()
            {
                debug!("engine stopped before execution report delivery");
            }
        });
    }

    /// Cancel a transmitted order at the broker.
    pub fn cancel(&self, broker_order_id: BrokerOrderId) {
        let broker = Arc::clone(&self.broker);
        tokio::spawn(async move {
            if let Err(err) = broker.cancel_order(&broker_order_id).await {
                error!(broker_order_id = %broker_order_id, %err, "broker cancel failed");
            }
        });
    }

    /// Start the fill pump: consumes the broker's fill stream and forwards
    /// every confirmation into the manager mailbox.
    pub fn spawn_fill_pump(&self) -> JoinHandle<()> {
        let mut fills = self.broker.stream_fills();
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            while let Some(fill) = fills.next().await {
                if mailbox.send(EngineCommand::Fill(fill)).await.is_err() {
                    break;
                }
            }
            debug!("fill pump stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBrokerAdapter;
    use crate::domain::OrderSide;
    use rust_decimal::Decimal;

    fn ticket() -> OrderTicket {
        OrderTicket {
            order_id: OrderId::new("ord-1"),
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            quantity: Decimal::new(100, 0),
        }
    }

    #[tokio::test]
    async fn submit_reports_broker_ack() {
        let broker = Arc::new(MockBrokerAdapter::new());
        let (tx, mut rx) = mpsc::channel(8);
        let executor = OrderExecutor::new(broker, tx);

        executor.submit(ticket());

        match rx.recv().await.unwrap() {
            EngineCommand::ExecutorReport(ExecutionReport::Submitted {
                order_id,
                broker_order_id,
            }) => {
                assert_eq!(order_id, OrderId::new("ord-1"));
                assert_eq!(broker_order_id.as_str(), "broker-1");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_reports_rejection() {
        let broker = Arc::new(MockBrokerAdapter::new());
        broker.reject_next("market closed");
        let (tx, mut rx) = mpsc::channel(8);
        let executor = OrderExecutor::new(broker, tx);

        executor.submit(ticket());

        match rx.recv().await.unwrap() {
            EngineCommand::ExecutorReport(ExecutionReport::Rejected { reason, .. }) => {
                assert!(reason.contains("market closed"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fill_pump_forwards_confirmations() {
        let broker = Arc::new(MockBrokerAdapter::new());
        let (tx, mut rx) = mpsc::channel(8);
        let executor = OrderExecutor::new(Arc::clone(&broker) as Arc<dyn BrokerAdapter>, tx);

        let _pump = executor.spawn_fill_pump();
        let broker_id = broker.place_order(&ticket()).await.unwrap();
        broker
            .confirm_fill(&broker_id, Decimal::new(100, 0), Decimal::new(150, 0))
            .unwrap();

        match rx.recv().await.unwrap() {
            EngineCommand::Fill(fill) => {
                assert_eq!(fill.broker_order_id, broker_id);
                assert_eq!(fill.filled_qty, Decimal::new(100, 0));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_reaches_the_broker() {
        let broker = Arc::new(MockBrokerAdapter::new());
        let (tx, _rx) = mpsc::channel(8);
        let executor = OrderExecutor::new(Arc::clone(&broker) as Arc<dyn BrokerAdapter>, tx);

        let broker_id = broker.place_order(&ticket()).await.unwrap();
        executor.cancel(broker_id.clone());

        // The cancel runs on a spawned task; yield until it lands.
        for _ in 0..50 {
            if !broker.cancelled_orders().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(broker.cancelled_orders(), vec![broker_id]);
    }
}
