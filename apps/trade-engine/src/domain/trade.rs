//! Trade aggregate: one entry order plus its contingent exits.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::active_stop::ActiveStop;
use super::ids::{BrokerOrderId, OcaGroupId, OrderId, TradeId};
use super::order::{Order, OrderKind};
use super::rule::{OrderRule, PortfolioFilter, Rule, TrailBy, TrailingRule};
use super::status::{OrderStatus, TradeStatus};

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Profit from rising prices.
    Long,
    /// Profit from falling prices.
    Short,
}

/// User-supplied definition of a trade to activate.
///
/// Trigger levels are raw prices; the engine derives the comparator from the
/// direction (a long entry fires at-or-above, its stop at-or-below, and the
/// short case mirrors).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeDefinition {
    /// Symbol to trade.
    pub symbol: String,
    /// Position direction.
    pub direction: Direction,
    /// Intended quantity.
    pub quantity: Decimal,
    /// Entry trigger level.
    pub entry_trigger: Decimal,
    /// Static protective stop level.
    pub initial_stop: Option<Decimal>,
    /// Trailing stop distance.
    pub trailing_stop: Option<TrailBy>,
    /// Profit-target level.
    pub take_profit: Option<Decimal>,
    /// Buying-power gate applied before entry submission.
    pub portfolio_filter: Option<PortfolioFilter>,
}

/// Fields a user modify may change on a live (non-terminal) trade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeChanges {
    /// New entry trigger level (only while the entry is still virtual).
    pub entry_trigger: Option<Decimal>,
    /// New static stop level.
    pub initial_stop: Option<Decimal>,
    /// New profit-target level.
    pub take_profit: Option<Decimal>,
    /// New intended quantity (only while the entry is still virtual).
    pub quantity: Option<Decimal>,
}

impl TradeChanges {
    /// Whether the change set is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entry_trigger.is_none()
            && self.initial_stop.is_none()
            && self.take_profit.is_none()
            && self.quantity.is_none()
    }
}

/// The persisted trade aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Aggregate identifier.
    pub id: TradeId,
    /// Symbol being traded.
    pub symbol: String,
    /// Position direction.
    pub direction: Direction,
    /// Intended quantity.
    pub quantity: Decimal,
    /// Broker-confirmed entry quantity; differs from `quantity` on partial
    /// fill and drives all downstream sizing.
    pub filled_quantity: Decimal,
    /// The parent order that opens the position.
    pub entry_order: Order,
    /// Contingent exits, at most one of each kind.
    pub child_orders: Vec<Order>,
    /// Buying-power gate, if configured.
    pub portfolio_filter: Option<PortfolioFilter>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    /// Build a trade from a validated definition.
    ///
    /// The entry and every configured child start in `Draft`; activation
    /// promotes the entry to `Working`, and the entry fill promotes the
    /// children.
    #[must_use]
    pub fn from_definition(definition: &TradeDefinition) -> Self {
        let direction = definition.direction;
        let entry_rule = OrderRule::Entry(entry_rule_for(direction, definition.entry_trigger));
        let entry_order = Order::entry(direction, entry_rule, definition.quantity);
        let parent_id = entry_order.order_id.clone();

        let mut child_orders = Vec::new();
        if let Some(stop) = definition.initial_stop {
            child_orders.push(Order::child(
                direction,
                parent_id.clone(),
                OrderRule::InitialStop(stop_rule_for(direction, stop)),
                definition.quantity,
            ));
        }
        if let Some(trail) = definition.trailing_stop {
            child_orders.push(Order::child(
                direction,
                parent_id.clone(),
                OrderRule::TrailingStop(TrailingRule::new(trail)),
                definition.quantity,
            ));
        }
        if let Some(target) = definition.take_profit {
            child_orders.push(Order::child(
                direction,
                parent_id,
                OrderRule::TakeProfit(target_rule_for(direction, target)),
                definition.quantity,
            ));
        }

        let now = Utc::now();
        Self {
            id: TradeId::generate(),
            symbol: definition.symbol.clone(),
            direction,
            quantity: definition.quantity,
            filled_quantity: Decimal::ZERO,
            entry_order,
            child_orders,
            portfolio_filter: definition.portfolio_filter,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derived trade status; a pure function of the order statuses.
    #[must_use]
    pub fn status(&self) -> TradeStatus {
        match self.entry_order.status {
            OrderStatus::Draft | OrderStatus::Working | OrderStatus::Inactive => TradeStatus::Blank,
            OrderStatus::EntryOrderSubmitted => TradeStatus::Pending,
            // A rejected entry leaves the trade in its last known-good derived
            // state; the rejection stays visible on the order itself. Once the
            // user cancels the remaining children the trade is terminal.
            OrderStatus::Rejected => {
                if self
                    .child_orders
                    .iter()
                    .all(|child| child.status.is_terminal())
                {
                    TradeStatus::Cancelled
                } else {
                    TradeStatus::Pending
                }
            }
            OrderStatus::Cancelled => TradeStatus::Cancelled,
            OrderStatus::Filled => {
                if self.children_resolved() && self.position_flat() {
                    TradeStatus::Closed
                } else {
                    TradeStatus::Filled
                }
            }
            // Contingent statuses never appear on an entry order.
            OrderStatus::ContingentOrderSubmitted | OrderStatus::ContingentOrderWorking => {
                TradeStatus::Pending
            }
        }
    }

    /// Whether every child is terminal or suspended.
    fn children_resolved(&self) -> bool {
        self.child_orders
            .iter()
            .all(|child| child.status.is_terminal() || child.status == OrderStatus::Inactive)
    }

    /// Whether the exits' confirmed quantity covers the open position.
    #[must_use]
    pub fn position_flat(&self) -> bool {
        self.exit_filled_qty() >= self.filled_quantity
    }

    /// Confirmed quantity filled across all exits.
    #[must_use]
    pub fn exit_filled_qty(&self) -> Decimal {
        self.child_orders.iter().map(|child| child.filled_qty).sum()
    }

    /// The child order of a given kind, if configured.
    #[must_use]
    pub fn child(&self, kind: OrderKind) -> Option<&Order> {
        self.child_orders.iter().find(|child| child.kind == kind)
    }

    /// Mutable child order of a given kind.
    pub fn child_mut(&mut self, kind: OrderKind) -> Option<&mut Order> {
        self.child_orders
            .iter_mut()
            .find(|child| child.kind == kind)
    }

    /// Look up any order (entry or child) by id.
    #[must_use]
    pub fn order(&self, order_id: &OrderId) -> Option<&Order> {
        if self.entry_order.order_id == *order_id {
            return Some(&self.entry_order);
        }
        self.child_orders
            .iter()
            .find(|child| child.order_id == *order_id)
    }

    /// Mutable lookup of any order by id.
    pub fn order_mut(&mut self, order_id: &OrderId) -> Option<&mut Order> {
        if self.entry_order.order_id == *order_id {
            return Some(&mut self.entry_order);
        }
        self.child_orders
            .iter_mut()
            .find(|child| child.order_id == *order_id)
    }

    /// Look up any order by the broker's id.
    #[must_use]
    pub fn order_by_broker_id(&self, broker_id: &BrokerOrderId) -> Option<&Order> {
        if self.entry_order.broker_order_id.as_ref() == Some(broker_id) {
            return Some(&self.entry_order);
        }
        self.child_orders
            .iter()
            .find(|child| child.broker_order_id.as_ref() == Some(broker_id))
    }

    /// Assign a fresh OCA group shared by every child.
    ///
    /// Called once, when the entry fills and the children go live together.
    pub fn assign_oca_group(&mut self) -> OcaGroupId {
        let group = OcaGroupId::generate();
        for child in &mut self.child_orders {
            child.oca_group = Some(group.clone());
        }
        group
    }

    /// Sibling orders sharing `oca_group`, excluding `winner`.
    #[must_use]
    pub fn oca_siblings(&self, group: &OcaGroupId, winner: &OrderId) -> Vec<OrderId> {
        self.child_orders
            .iter()
            .filter(|child| {
                child.oca_group.as_ref() == Some(group) && child.order_id != *winner
            })
            .map(|child| child.order_id.clone())
            .collect()
    }

    /// Stamp a mutation time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Read-only projection handed to the surrounding application.
    #[must_use]
    pub fn view(&self, active_stop: Option<ActiveStop>) -> TradeView {
        TradeView {
            id: self.id.clone(),
            symbol: self.symbol.clone(),
            direction: self.direction,
            quantity: self.quantity,
            filled_quantity: self.filled_quantity,
            trade_status: self.status(),
            active_stop,
            entry_order: self.entry_order.clone(),
            child_orders: self.child_orders.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Read-only trade projection, including the derived active stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeView {
    /// Aggregate identifier.
    pub id: TradeId,
    /// Symbol being traded.
    pub symbol: String,
    /// Position direction.
    pub direction: Direction,
    /// Intended quantity.
    pub quantity: Decimal,
    /// Broker-confirmed entry quantity.
    pub filled_quantity: Decimal,
    /// Derived trade status.
    pub trade_status: TradeStatus,
    /// Currently binding stop, when the position is open.
    pub active_stop: Option<ActiveStop>,
    /// Entry order.
    pub entry_order: Order,
    /// Contingent exits.
    pub child_orders: Vec<Order>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Entry rule for a direction: long fires at-or-above, short at-or-below.
#[must_use]
pub const fn entry_rule_for(direction: Direction, trigger: Decimal) -> Rule {
    match direction {
        Direction::Long => Rule::price_at_or_above(trigger),
        Direction::Short => Rule::price_at_or_below(trigger),
    }
}

/// Stop rule for a direction: long stops out at-or-below, short at-or-above.
#[must_use]
pub const fn stop_rule_for(direction: Direction, stop: Decimal) -> Rule {
    match direction {
        Direction::Long => Rule::price_at_or_below(stop),
        Direction::Short => Rule::price_at_or_above(stop),
    }
}

/// Take-profit rule for a direction: long targets at-or-above, short
/// at-or-below.
#[must_use]
pub const fn target_rule_for(direction: Direction, target: Decimal) -> Rule {
    match direction {
        Direction::Long => Rule::price_at_or_above(target),
        Direction::Short => Rule::price_at_or_below(target),
    }
}
