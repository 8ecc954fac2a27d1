//! Order record: entry or contingent exit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{BrokerOrderId, OcaGroupId, OrderId};
use super::rule::OrderRule;
use super::status::OrderStatus;
use super::trade::Direction;

/// What role an order plays inside its trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    /// Parent order that opens the position.
    Entry,
    /// Static protective stop exit.
    InitialStop,
    /// Ratcheting trailing-stop exit.
    TrailingStop,
    /// Profit-target exit.
    TakeProfit,
}

impl OrderKind {
    /// Returns true for the exit (child) kinds.
    #[must_use]
    pub const fn is_exit(&self) -> bool {
        !matches!(self, Self::Entry)
    }
}

/// Buy/sell side as transmitted to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

impl OrderSide {
    /// Side for an order of `kind` in a trade of `direction`.
    ///
    /// The entry takes the direction's opening side; every exit takes the
    /// closing side.
    #[must_use]
    pub const fn for_kind(direction: Direction, kind: OrderKind) -> Self {
        match (direction, kind.is_exit()) {
            (Direction::Long, false) | (Direction::Short, true) => Self::Buy,
            (Direction::Long, true) | (Direction::Short, false) => Self::Sell,
        }
    }
}

/// A single order, entry or contingent exit.
///
/// Orders are virtual until their own trigger fires; while virtual they have
/// never been shown to the broker and carry no `broker_order_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Engine-internal identifier.
    pub order_id: OrderId,
    /// Entry order id for children; `None` on the entry itself.
    pub parent_id: Option<OrderId>,
    /// Grouping key shared by sibling exits; assigned when the children go
    /// live together.
    pub oca_group: Option<OcaGroupId>,
    /// Role of the order inside its trade.
    pub kind: OrderKind,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Side transmitted to the broker on submission.
    pub side: OrderSide,
    /// Defining trigger condition.
    pub rule: OrderRule,
    /// Quantity the order intends to trade.
    pub requested_qty: Decimal,
    /// Broker-confirmed filled quantity.
    pub filled_qty: Decimal,
    /// Broker-confirmed average fill price.
    pub fill_price: Option<Decimal>,
    /// Broker's id for the transmitted order; `None` until acknowledged.
    pub broker_order_id: Option<BrokerOrderId>,
}

impl Order {
    /// Create the entry order for a trade.
    #[must_use]
    pub fn entry(direction: Direction, rule: OrderRule, requested_qty: Decimal) -> Self {
        Self {
            order_id: OrderId::generate(),
            parent_id: None,
            oca_group: None,
            kind: OrderKind::Entry,
            status: OrderStatus::Draft,
            side: OrderSide::for_kind(direction, OrderKind::Entry),
            rule,
            requested_qty,
            filled_qty: Decimal::ZERO,
            fill_price: None,
            broker_order_id: None,
        }
    }

    /// Create a child (exit) order tied to `parent_id`.
    #[must_use]
    pub fn child(
        direction: Direction,
        parent_id: OrderId,
        rule: OrderRule,
        requested_qty: Decimal,
    ) -> Self {
        let kind = rule.kind();
        Self {
            order_id: OrderId::generate(),
            parent_id: Some(parent_id),
            oca_group: None,
            kind,
            status: OrderStatus::Draft,
            side: OrderSide::for_kind(direction, kind),
            rule,
            requested_qty,
            filled_qty: Decimal::ZERO,
            fill_price: None,
            broker_order_id: None,
        }
    }

    /// Record a broker-confirmed fill.
    ///
    /// Only stores the confirmed quantities; the status change itself goes
    /// through the validator at the call site.
    pub fn record_fill(&mut self, filled_qty: Decimal, fill_price: Decimal) {
        self.filled_qty = filled_qty;
        self.fill_price = Some(fill_price);
    }

    /// Whether the virtual-order invariant holds: an order the broker has
    /// never seen carries no broker id.
    #[must_use]
    pub const fn broker_id_consistent(&self) -> bool {
        !(self.status.is_virtual() && self.broker_order_id.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::Rule;

    fn entry_rule() -> OrderRule {
        OrderRule::Entry(Rule::price_at_or_above(Decimal::new(150, 0)))
    }

    fn stop_rule() -> OrderRule {
        OrderRule::InitialStop(Rule::price_at_or_below(Decimal::new(140, 0)))
    }

    #[test]
    fn entry_order_starts_draft_and_virtual() {
        let order = Order::entry(Direction::Long, entry_rule(), Decimal::new(100, 0));
        assert_eq!(order.kind, OrderKind::Entry);
        assert_eq!(order.status, OrderStatus::Draft);
        assert!(order.parent_id.is_none());
        assert!(order.oca_group.is_none());
        assert!(order.broker_order_id.is_none());
        assert!(order.broker_id_consistent());
    }

    #[test]
    fn child_kind_follows_rule() {
        let parent = OrderId::new("parent-1");
        let child = Order::child(
            Direction::Long,
            parent.clone(),
            stop_rule(),
            Decimal::new(100, 0),
        );
        assert_eq!(child.kind, OrderKind::InitialStop);
        assert_eq!(child.parent_id, Some(parent));
    }

    #[test]
    fn sides_for_long_trade() {
        assert_eq!(
            OrderSide::for_kind(Direction::Long, OrderKind::Entry),
            OrderSide::Buy
        );
        assert_eq!(
            OrderSide::for_kind(Direction::Long, OrderKind::InitialStop),
            OrderSide::Sell
        );
        assert_eq!(
            OrderSide::for_kind(Direction::Long, OrderKind::TakeProfit),
            OrderSide::Sell
        );
    }

    #[test]
    fn sides_for_short_trade() {
        assert_eq!(
            OrderSide::for_kind(Direction::Short, OrderKind::Entry),
            OrderSide::Sell
        );
        assert_eq!(
            OrderSide::for_kind(Direction::Short, OrderKind::TrailingStop),
            OrderSide::Buy
        );
    }

    #[test]
    fn record_fill_stores_confirmed_values() {
        let mut order = Order::entry(Direction::Long, entry_rule(), Decimal::new(100, 0));
        order.record_fill(Decimal::new(60, 0), Decimal::new(15050, 2));
        assert_eq!(order.filled_qty, Decimal::new(60, 0));
        assert_eq!(order.fill_price, Some(Decimal::new(15050, 2)));
        // Requested quantity is untouched; downstream sizing uses filled_qty.
        assert_eq!(order.requested_qty, Decimal::new(100, 0));
    }

    #[test]
    fn broker_id_on_virtual_order_violates_invariant() {
        let mut order = Order::entry(Direction::Long, entry_rule(), Decimal::new(100, 0));
        order.broker_order_id = Some(BrokerOrderId::new("brk-1"));
        assert!(!order.broker_id_consistent());
    }
}
