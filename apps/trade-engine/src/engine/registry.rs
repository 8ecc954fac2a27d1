//! Owned trade registry.
//!
//! Index of live trades keyed by id, with secondary indexes for symbol-based
//! tick dispatch and broker-id fill routing. Injected into the manager so
//! multiple engine instances and test harnesses run in isolation.

use std::collections::HashMap;

use crate::domain::{BrokerOrderId, OrderId, Trade, TradeId};

/// In-memory index of every trade the engine knows about.
#[derive(Debug, Default)]
pub struct TradeRegistry {
    trades: HashMap<TradeId, Trade>,
    by_symbol: HashMap<String, Vec<TradeId>>,
    by_order: HashMap<OrderId, TradeId>,
    by_broker_order: HashMap<BrokerOrderId, TradeId>,
}

impl TradeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from recovered trades.
    #[must_use]
    pub fn from_trades(trades: Vec<Trade>) -> Self {
        let mut registry = Self::new();
        for trade in trades {
            registry.insert(trade);
        }
        registry
    }

    /// Insert a trade, indexing its symbol, orders, and any broker ids.
    pub fn insert(&mut self, trade: Trade) {
        let trade_id = trade.id.clone();

        self.by_symbol
            .entry(trade.symbol.clone())
            .or_default()
            .push(trade_id.clone());

        self.by_order
            .insert(trade.entry_order.order_id.clone(), trade_id.clone());
        if let Some(broker_id) = &trade.entry_order.broker_order_id {
            self.by_broker_order
                .insert(broker_id.clone(), trade_id.clone());
        }
        for child in &trade.child_orders {
            self.by_order
                .insert(child.order_id.clone(), trade_id.clone());
            if let Some(broker_id) = &child.broker_order_id {
                self.by_broker_order
                    .insert(broker_id.clone(), trade_id.clone());
            }
        }

        self.trades.insert(trade_id, trade);
    }

    /// Record the broker id assigned to one of a trade's orders.
    pub fn link_broker_order(&mut self, broker_id: BrokerOrderId, trade_id: TradeId) {
        self.by_broker_order.insert(broker_id, trade_id);
    }

    /// Trade by id.
    #[must_use]
    pub fn get(&self, id: &TradeId) -> Option<&Trade> {
        self.trades.get(id)
    }

    /// Mutable trade by id.
    pub fn get_mut(&mut self, id: &TradeId) -> Option<&mut Trade> {
        self.trades.get_mut(id)
    }

    /// Trade ids listening on a symbol.
    #[must_use]
    pub fn trades_for_symbol(&self, symbol: &str) -> Vec<TradeId> {
        self.by_symbol.get(symbol).cloned().unwrap_or_default()
    }

    /// Trade owning an order id.
    #[must_use]
    pub fn trade_for_order(&self, order_id: &OrderId) -> Option<&TradeId> {
        self.by_order.get(order_id)
    }

    /// Trade owning a broker order id.
    #[must_use]
    pub fn trade_for_broker_order(&self, broker_id: &BrokerOrderId) -> Option<&TradeId> {
        self.by_broker_order.get(broker_id)
    }

    /// Number of registered trades.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trades.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Iterate over all trades.
    pub fn iter(&self) -> impl Iterator<Item = &Trade> {
        self.trades.values()
    }
}
