//! Mock broker adapter for tests and the demo binary.
//!
//! Returns simulated responses without touching a real brokerage. Broker
//! order ids are generated sequentially; fills are injected by the test and
//! delivered through the same stream a live adapter would use.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::domain::BrokerOrderId;

use super::{BrokerAdapter, BrokerError, BrokerOpenOrder, FillEvent, OrderTicket, Position};

#[derive(Debug, Default)]
struct MockState {
    placed: Vec<(BrokerOrderId, OrderTicket)>,
    open: Vec<BrokerOpenOrder>,
    cancelled: Vec<BrokerOrderId>,
    reject_next: Option<String>,
    positions: Vec<Position>,
    buying_power: Option<Decimal>,
}

/// In-process broker double.
#[derive(Debug)]
pub struct MockBrokerAdapter {
    order_counter: AtomicU64,
    state: Mutex<MockState>,
    fill_tx: broadcast::Sender<FillEvent>,
}

impl Default for MockBrokerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrokerAdapter {
    /// Create a new mock broker.
    #[must_use]
    pub fn new() -> Self {
        let (fill_tx, _) = broadcast::channel(64);
        Self {
            order_counter: AtomicU64::new(1),
            state: Mutex::new(MockState::default()),
            fill_tx,
        }
    }

    /// Every ticket transmitted so far, in order.
    #[must_use]
    pub fn placed_orders(&self) -> Vec<OrderTicket> {
        self.lock()
            .placed
            .iter()
            .map(|(_, ticket)| ticket.clone())
            .collect()
    }

    /// Every broker id cancelled so far.
    #[must_use]
    pub fn cancelled_orders(&self) -> Vec<BrokerOrderId> {
        self.lock().cancelled.clone()
    }

    /// Refuse the next `place_order` with the given reason.
    pub fn reject_next(&self, reason: impl Into<String>) {
        self.lock().reject_next = Some(reason.into());
    }

    /// Seed the open-order blotter (for recovery scenarios).
    pub fn seed_open_order(&self, order: BrokerOpenOrder) {
        self.lock().open.push(order);
    }

    /// Seed reported positions.
    pub fn set_positions(&self, positions: Vec<Position>) {
        self.lock().positions = positions;
    }

    /// Seed reported buying power.
    pub fn set_buying_power(&self, buying_power: Decimal) {
        self.lock().buying_power = Some(buying_power);
    }

    /// Confirm a fill for a transmitted order.
    ///
    /// Looks the ticket up by broker id, removes it from the blotter, and
    /// delivers a [`FillEvent`] through the fill stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker id is unknown.
    pub fn confirm_fill(
        &self,
        broker_order_id: &BrokerOrderId,
        filled_qty: Decimal,
        fill_price: Decimal,
    ) -> Result<(), BrokerError> {
        let symbol = {
            let mut state = self.lock();
            let ticket = state
                .placed
                .iter()
                .find(|(id, _)| id == broker_order_id)
                .map(|(_, ticket)| ticket.clone())
                .ok_or_else(|| BrokerError::UnknownOrder(broker_order_id.clone()))?;
            state.open.retain(|open| open.broker_order_id != *broker_order_id);
            ticket.symbol
        };

        let event = FillEvent {
            broker_order_id: broker_order_id.clone(),
            symbol,
            filled_qty,
            fill_price,
            timestamp: Utc::now(),
        };
        // Nobody listening is fine: the event is simply dropped.
        let _ = self.fill_tx.send(event);
        Ok(())
    }

    /// Broker id of the most recently placed order.
    #[must_use]
    pub fn last_broker_id(&self) -> Option<BrokerOrderId> {
        self.lock().placed.last().map(|(id, _)| id.clone())
    }

    #[allow(clippy::unwrap_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl BrokerAdapter for MockBrokerAdapter {
    async fn connect(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn place_order(&self, ticket: &OrderTicket) -> Result<BrokerOrderId, BrokerError> {
        let mut state = self.lock();
        if let Some(reason) = state.reject_next.take() {
            return Err(BrokerError::Rejected(reason));
        }

        let id = self.order_counter.fetch_add(1, Ordering::SeqCst);
        let broker_order_id = BrokerOrderId::new(format!("broker-{id}"));
        state.open.push(BrokerOpenOrder {
            broker_order_id: broker_order_id.clone(),
            symbol: ticket.symbol.clone(),
            side: ticket.side,
            quantity: ticket.quantity,
        });
        state.placed.push((broker_order_id.clone(), ticket.clone()));
        Ok(broker_order_id)
    }

    async fn cancel_order(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError> {
        let mut state = self.lock();
        state
            .open
            .retain(|open| open.broker_order_id != *broker_order_id);
        state.cancelled.push(broker_order_id.clone());
        Ok(())
    }

    fn stream_fills(&self) -> BoxStream<'static, FillEvent> {
        BroadcastStream::new(self.fill_tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }

    async fn get_open_orders(&self) -> Result<Vec<BrokerOpenOrder>, BrokerError> {
        Ok(self.lock().open.clone())
    }

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError> {
        Ok(self.lock().positions.clone())
    }

    async fn get_buying_power(&self) -> Result<Decimal, BrokerError> {
        Ok(self.lock().buying_power.unwrap_or(Decimal::MAX))
    }
}
