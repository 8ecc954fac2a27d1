//! Broker adapter boundary.
//!
//! The only surface the broker ever crosses. Every call is "execute this
//! single order now": no bracket, OCO, or contingent structure is ever
//! transmitted. Staging, OCA grouping, and trailing recalculation all live
//! inside the engine.

pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{BrokerOrderId, OrderId, OrderSide};

pub use mock::MockBrokerAdapter;

/// A single immediate-execution command.
///
/// This is the entire vocabulary the broker sees; the trigger rule that
/// produced it never leaves the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTicket {
    /// Engine order id, echoed back on fills.
    pub order_id: OrderId,
    /// Symbol to trade.
    pub symbol: String,
    /// Side.
    pub side: OrderSide,
    /// Quantity to execute now.
    pub quantity: Decimal,
}

/// Broker-confirmed execution of a transmitted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillEvent {
    /// Broker's id for the order.
    pub broker_order_id: BrokerOrderId,
    /// Symbol traded.
    pub symbol: String,
    /// Confirmed quantity; drives all downstream sizing and P&L.
    pub filled_qty: Decimal,
    /// Average fill price.
    pub fill_price: Decimal,
    /// Execution timestamp.
    pub timestamp: DateTime<Utc>,
}

/// An open order as reported by the broker's blotter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerOpenOrder {
    /// Broker's id for the order.
    pub broker_order_id: BrokerOrderId,
    /// Symbol.
    pub symbol: String,
    /// Side.
    pub side: OrderSide,
    /// Remaining quantity.
    pub quantity: Decimal,
}

/// A position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Symbol.
    pub symbol: String,
    /// Signed quantity (negative for short).
    pub quantity: Decimal,
    /// Average entry price.
    pub avg_price: Decimal,
}

/// Broker boundary error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    /// Connection-level failure.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// The broker refused the order.
    #[error("order rejected by broker: {0}")]
    Rejected(String),

    /// The broker does not know the referenced order.
    #[error("unknown broker order: {0}")]
    UnknownOrder(BrokerOrderId),
}

/// Port to a brokerage.
///
/// Implementations translate these calls into the concrete broker API; the
/// engine never sees anything broker-specific beyond [`BrokerOrderId`].
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Establish the session.
    async fn connect(&self) -> Result<(), BrokerError>;

    /// Tear the session down.
    async fn disconnect(&self) -> Result<(), BrokerError>;

    /// Transmit one immediate-execution order.
    async fn place_order(&self, ticket: &OrderTicket) -> Result<BrokerOrderId, BrokerError>;

    /// Cancel a previously transmitted order.
    async fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError>;

    /// Asynchronous sequence of fill confirmations.
    fn stream_fills(&self) -> BoxStream<'static, FillEvent>;

    /// The broker's open-order blotter, used by startup reconciliation.
    async fn get_open_orders(&self) -> Result<Vec<BrokerOpenOrder>, BrokerError>;

    /// Current positions.
    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError>;

    /// Account buying power, for the portfolio filter.
    async fn get_buying_power(&self) -> Result<Decimal, BrokerError>;
}
