//! Trade manager: the orchestrating actor.
//!
//! Owns the trade registry and drains a mailbox of ticks, executor reports,
//! fills, and user actions. Processing is strictly sequential, which is what
//! serializes status transitions per trade: a fill and a tick for the same
//! trade can never interleave. Order placement and fill delivery run on
//! separate tasks and feed back into the same mailbox.
//!
//! Every status mutation goes through the validator, and the mutated record
//! is persisted before any broker call that depends on it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::broker::{FillEvent, OrderTicket};
use crate::domain::trade::{entry_rule_for, stop_rule_for, target_rule_for};
use crate::domain::{
    BrokerOrderId, MarketSnapshot, Order, OrderId, OrderKind, OrderRule, OrderStatus,
    StatusValidator, Trade, TradeChanges, TradeDefinition, TradeId, TradeStatus, TradeView,
    TransitionError, select_active_stop,
};
use crate::store::TradeStore;

use super::executor::{ExecutionReport, OrderExecutor};
use super::registry::TradeRegistry;
use super::validation::{self, ValidationError};

/// Why an activation request was not accepted.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// The definition failed validation; every reason is listed.
    #[error("trade definition rejected ({} reasons)", .0.len())]
    Invalid(Vec<ValidationError>),

    /// The trade could not be persisted, so it was not accepted.
    #[error("activation could not be persisted: {0}")]
    Persistence(String),

    /// The engine is no longer running.
    #[error("engine stopped")]
    Stopped,
}

/// Errors surfaced to user actions (modify, cancel, lookups).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown trade id.
    #[error("trade not found: {0}")]
    TradeNotFound(TradeId),

    /// The trade already reached Closed or Cancelled.
    #[error("trade {0} is terminal")]
    TradeTerminal(TradeId),

    /// Processing for the trade stopped after a persistence failure.
    #[error("trade {0} is halted pending manual review")]
    TradeHalted(TradeId),

    /// The requested change cannot be applied.
    #[error("invalid change: {0}")]
    InvalidChange(String),

    /// Illegal status transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The engine is no longer running.
    #[error("engine stopped")]
    Stopped,
}

/// Messages drained by the manager actor.
#[derive(Debug)]
pub enum EngineCommand {
    /// Price tick from the market-data collaborator.
    Tick {
        /// Symbol the tick belongs to.
        symbol: String,
        /// Last traded price.
        price: Decimal,
        /// Tick timestamp.
        timestamp: DateTime<Utc>,
    },
    /// Fill confirmation from the broker's fill stream.
    Fill(FillEvent),
    /// Placement outcome from the executor.
    ExecutorReport(ExecutionReport),
    /// Refreshed portfolio view for the buying-power gate.
    PortfolioUpdate {
        /// Current account buying power.
        buying_power: Decimal,
    },
    /// Validate and activate a trade definition.
    Activate {
        /// The definition to activate.
        definition: TradeDefinition,
        /// Reply channel.
        reply: oneshot::Sender<Result<TradeId, ActivationError>>,
    },
    /// Apply user changes to a live trade.
    Modify {
        /// Target trade.
        trade_id: TradeId,
        /// Changes to apply.
        changes: TradeChanges,
        /// Reply channel.
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Cancel a trade's remaining orders.
    Cancel {
        /// Target trade.
        trade_id: TradeId,
        /// Reply channel.
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Read-only projection of a trade.
    GetTrade {
        /// Target trade.
        trade_id: TradeId,
        /// Reply channel.
        reply: oneshot::Sender<Option<TradeView>>,
    },
    /// Stop the actor.
    Shutdown,
}

/// The orchestrator. See the module docs for the threading model.
pub struct TradeManager {
    registry: TradeRegistry,
    store: Arc<dyn TradeStore>,
    executor: OrderExecutor,
    halted: HashSet<TradeId>,
    last_tick: HashMap<String, DateTime<Utc>>,
    buying_power: Option<Decimal>,
    // Fills that arrived before the submission ack linked their broker id.
    pending_fills: HashMap<BrokerOrderId, FillEvent>,
}

impl TradeManager {
    /// Create a manager over an owned registry.
    pub fn new(
        registry: TradeRegistry,
        store: Arc<dyn TradeStore>,
        executor: OrderExecutor,
    ) -> Self {
        Self {
            registry,
            store,
            executor,
            halted: HashSet::new(),
            last_tick: HashMap::new(),
            buying_power: None,
            pending_fills: HashMap::new(),
        }
    }

    /// Drain the mailbox until shutdown.
    pub async fn run(mut self, mut mailbox: mpsc::Receiver<EngineCommand>) {
        info!(trades = self.registry.len(), "trade manager started");
        while let Some(command) = mailbox.recv().await {
            if matches!(command, EngineCommand::Shutdown) {
                break;
            }
            self.handle(command).await;
        }
        info!("trade manager stopped");
    }

    async fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Tick {
                symbol,
                price,
                timestamp,
            } => self.handle_tick(symbol, price, timestamp).await,
            EngineCommand::Fill(fill) => self.handle_fill(fill).await,
            EngineCommand::ExecutorReport(report) => self.handle_executor_report(report).await,
            EngineCommand::PortfolioUpdate { buying_power } => {
                self.buying_power = Some(buying_power);
            }
            EngineCommand::Activate { definition, reply } => {
                let _ = reply.send(self.handle_activate(definition).await);
            }
            EngineCommand::Modify {
                trade_id,
                changes,
                reply,
            } => {
                let _ = reply.send(self.handle_modify(&trade_id, changes).await);
            }
            EngineCommand::Cancel { trade_id, reply } => {
                let _ = reply.send(self.handle_cancel(&trade_id).await);
            }
            EngineCommand::GetTrade { trade_id, reply } => {
                let view = self
                    .registry
                    .get(&trade_id)
                    .map(|trade| trade.view(select_active_stop(trade)));
                let _ = reply.send(view);
            }
            EngineCommand::Shutdown => {}
        }
    }

    // ------------------------------------------------------------------
    // Tick evaluation
    // ------------------------------------------------------------------

    async fn handle_tick(&mut self, symbol: String, price: Decimal, timestamp: DateTime<Utc>) {
        if let Some(last) = self.last_tick.get(&symbol) {
            if timestamp < *last {
                warn!(%symbol, %price, "out-of-order tick dropped");
                return;
            }
        }
        self.last_tick.insert(symbol.clone(), timestamp);

        let snapshot = MarketSnapshot {
            symbol: symbol.clone(),
            price,
            timestamp,
            buying_power: self.buying_power,
        };

        for trade_id in self.registry.trades_for_symbol(&symbol) {
            if self.halted.contains(&trade_id) {
                continue;
            }
            let Some(trade) = self.registry.get(&trade_id) else {
                continue;
            };
            // Terminal trades never re-enter evaluation.
            if trade.status().is_terminal() {
                continue;
            }
            if let Err(err) = self.evaluate_trade(&trade_id, &snapshot).await {
                // One trade's failure must not starve the rest of the batch.
                error!(trade_id = %trade_id, %err, "trade evaluation failed");
            }
        }
    }

    async fn evaluate_trade(
        &mut self,
        trade_id: &TradeId,
        snapshot: &MarketSnapshot,
    ) -> Result<(), EngineError> {
        let Some(trade) = self.registry.get(trade_id) else {
            return Ok(());
        };

        if trade.entry_order.status == OrderStatus::Working {
            return self.evaluate_entry(trade_id, snapshot).await;
        }
        if trade.status() == TradeStatus::Filled {
            return self.evaluate_exits(trade_id, snapshot).await;
        }
        Ok(())
    }

    async fn evaluate_entry(
        &mut self,
        trade_id: &TradeId,
        snapshot: &MarketSnapshot,
    ) -> Result<(), EngineError> {
        let ticket = {
            let trade = self
                .registry
                .get_mut(trade_id)
                .ok_or_else(|| EngineError::TradeNotFound(trade_id.clone()))?;

            if !trade
                .entry_order
                .rule
                .evaluate(trade.direction, snapshot)
            {
                return Ok(());
            }

            let notional = trade.quantity * snapshot.price;
            if let Some(filter) = trade.portfolio_filter {
                if !filter.allows(notional, snapshot) {
                    warn!(
                        trade_id = %trade_id,
                        %notional,
                        buying_power = ?snapshot.buying_power,
                        "entry triggered but buying-power gate refused; order stays virtual"
                    );
                    return Ok(());
                }
            }

            StatusValidator::validate(
                trade.status(),
                trade.entry_order.status,
                OrderStatus::EntryOrderSubmitted,
            )?;
            trade.entry_order.status = OrderStatus::EntryOrderSubmitted;
            trade.touch();
            info!(
                trade_id = %trade_id,
                symbol = %trade.symbol,
                price = %snapshot.price,
                "entry triggered"
            );
            OrderTicket {
                order_id: trade.entry_order.order_id.clone(),
                symbol: trade.symbol.clone(),
                side: trade.entry_order.side,
                quantity: trade.entry_order.requested_qty,
            }
        };

        // Intent is durable before the broker sees anything.
        if self.persist(trade_id).await {
            self.executor.submit(ticket);
        }
        Ok(())
    }

    async fn evaluate_exits(
        &mut self,
        trade_id: &TradeId,
        snapshot: &MarketSnapshot,
    ) -> Result<(), EngineError> {
        let (ticket, ratchet_moved) = 'eval: {
            let trade = self
                .registry
                .get_mut(trade_id)
                .ok_or_else(|| EngineError::TradeNotFound(trade_id.clone()))?;
            let direction = trade.direction;

            // Ratchet the trailing level before selecting the binding stop.
            let mut ratchet_moved = false;
            if let Some(child) = trade.child_mut(OrderKind::TrailingStop) {
                if child.status == OrderStatus::Working {
                    if let OrderRule::TrailingStop(trailing) = &mut child.rule {
                        if let Some(level) = trailing.observe(direction, snapshot.price) {
                            debug!(trade_id = %trade_id, %level, "trailing stop ratcheted");
                            ratchet_moved = true;
                        }
                    }
                }
            }

            let active = select_active_stop(trade);
            if let Some(active) = active {
                debug!(
                    trade_id = %trade_id,
                    kind = ?active.kind,
                    price = %active.price,
                    "active stop selected"
                );
            }

            // An exit already at the broker owns the position until its fill
            // or cancel arrives; firing a sibling now could exit twice.
            if trade
                .child_orders
                .iter()
                .any(|child| child.status.is_submitted())
            {
                break 'eval (None, ratchet_moved);
            }

            // At most one exit fires per tick; the binding stop outranks the
            // profit target. Siblings stay untouched until a fill or cancel
            // confirmation arrives.
            let mut fired: Option<OrderId> = None;
            if let Some(active) = active {
                if let Some(child) = trade.child(active.kind) {
                    if child.status == OrderStatus::Working
                        && child.rule.evaluate(direction, snapshot)
                    {
                        fired = Some(child.order_id.clone());
                    }
                }
            }
            if fired.is_none() {
                if let Some(child) = trade.child(OrderKind::TakeProfit) {
                    if child.status == OrderStatus::Working
                        && child.rule.evaluate(direction, snapshot)
                    {
                        fired = Some(child.order_id.clone());
                    }
                }
            }

            let Some(order_id) = fired else {
                break 'eval (None, ratchet_moved);
            };

            let remaining = trade.filled_quantity - trade.exit_filled_qty();
            let trade_status = trade.status();
            let symbol = trade.symbol.clone();
            let order = trade
                .order_mut(&order_id)
                .ok_or_else(|| EngineError::TradeNotFound(trade_id.clone()))?;
            StatusValidator::validate(
                trade_status,
                order.status,
                OrderStatus::ContingentOrderSubmitted,
            )?;
            order.status = OrderStatus::ContingentOrderSubmitted;
            order.requested_qty = remaining;
            info!(
                trade_id = %trade_id,
                order_id = %order_id,
                kind = ?order.kind,
                price = %snapshot.price,
                "exit triggered"
            );
            let ticket = OrderTicket {
                order_id: order.order_id.clone(),
                symbol,
                side: order.side,
                quantity: remaining,
            };
            trade.touch();
            (Some(ticket), ratchet_moved)
        };

        match ticket {
            Some(ticket) => {
                // Intent is durable before the broker sees anything.
                if self.persist(trade_id).await {
                    self.executor.submit(ticket);
                }
            }
            None => {
                if ratchet_moved {
                    self.persist(trade_id).await;
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Broker confirmations
    // ------------------------------------------------------------------

    async fn handle_fill(&mut self, fill: FillEvent) {
        let Some(trade_id) = self
            .registry
            .trade_for_broker_order(&fill.broker_order_id)
            .cloned()
        else {
            // The placement ack may still be in flight; hold the fill until
            // the broker id is linked.
            debug!(broker_order_id = %fill.broker_order_id, "fill before submission ack; buffered");
            self.pending_fills
                .insert(fill.broker_order_id.clone(), fill);
            return;
        };

        let halted = self.halted.contains(&trade_id);
        if halted {
            // Real-money event on a halted trade: record it, but issue no
            // further broker calls until the trade is reviewed.
            error!(
                trade_id = %trade_id,
                broker_order_id = %fill.broker_order_id,
                "fill received for halted trade; manual review required"
            );
        }

        let kind = {
            let Some(trade) = self.registry.get(&trade_id) else {
                return;
            };
            let Some(order) = trade.order_by_broker_id(&fill.broker_order_id) else {
                debug!(broker_order_id = %fill.broker_order_id, "fill for unknown order");
                return;
            };
            order.kind
        };

        if kind == OrderKind::Entry {
            self.apply_entry_fill(&trade_id, &fill).await;
        } else {
            self.apply_exit_fill(&trade_id, &fill, halted).await;
        }
    }

    async fn apply_entry_fill(&mut self, trade_id: &TradeId, fill: &FillEvent) {
        {
            let Some(trade) = self.registry.get_mut(trade_id) else {
                return;
            };
            let trade_status = trade.status();
            if let Err(err) = StatusValidator::validate(
                trade_status,
                trade.entry_order.status,
                OrderStatus::Filled,
            ) {
                error!(trade_id = %trade_id, %err, "entry fill refused");
                return;
            }
            trade.entry_order.status = OrderStatus::Filled;
            trade
                .entry_order
                .record_fill(fill.filled_qty, fill.fill_price);
            // Confirmed quantity, not requested, drives everything downstream.
            trade.filled_quantity = fill.filled_qty;

            for child in &mut trade.child_orders {
                if child.status != OrderStatus::Draft {
                    continue;
                }
                match StatusValidator::validate_transition(child.status, OrderStatus::Working) {
                    Ok(()) => {
                        child.status = OrderStatus::Working;
                        child.requested_qty = fill.filled_qty;
                    }
                    Err(err) => error!(trade_id = %trade_id, %err, "child promotion refused"),
                }
            }
            trade.assign_oca_group();
            trade.touch();
            info!(
                trade_id = %trade_id,
                filled_qty = %fill.filled_qty,
                fill_price = %fill.fill_price,
                "entry filled; children working"
            );
        }
        self.persist(trade_id).await;
    }

    async fn apply_exit_fill(&mut self, trade_id: &TradeId, fill: &FillEvent, halted: bool) {
        let (broker_cancels, trade_status) = {
            let Some(trade) = self.registry.get_mut(trade_id) else {
                return;
            };
            let trade_status = trade.status();
            let Some(order) = trade.order_by_broker_id(&fill.broker_order_id) else {
                return;
            };
            let winner = order.order_id.clone();

            {
                let Some(order) = trade.order_mut(&winner) else {
                    return;
                };
                if let Err(err) =
                    StatusValidator::validate(trade_status, order.status, OrderStatus::Filled)
                {
                    error!(trade_id = %trade_id, %err, "exit fill refused");
                    return;
                }
                order.status = OrderStatus::Filled;
                order.record_fill(fill.filled_qty, fill.fill_price);
            }

            // One sibling filled: every other member of the OCA group must
            // reach Cancelled. Orders never transmitted are cancelled locally
            // and the broker is never told about them.
            let mut broker_cancels: Vec<BrokerOrderId> = Vec::new();
            let group = trade
                .order(&winner)
                .and_then(|order| order.oca_group.clone());
            if let Some(group) = group {
                for sibling_id in trade.oca_siblings(&group, &winner) {
                    let Some(sibling) = trade.order_mut(&sibling_id) else {
                        continue;
                    };
                    if sibling.status.is_terminal() {
                        continue;
                    }
                    match StatusValidator::validate_transition(
                        sibling.status,
                        OrderStatus::Cancelled,
                    ) {
                        Ok(()) => {
                            if let Some(broker_id) = sibling.broker_order_id.clone() {
                                broker_cancels.push(broker_id);
                            }
                            sibling.status = OrderStatus::Cancelled;
                            debug!(
                                trade_id = %trade_id,
                                order_id = %sibling_id,
                                "OCA sibling cancelled"
                            );
                        }
                        Err(err) => {
                            error!(trade_id = %trade_id, %err, "OCA cancel refused");
                        }
                    }
                }
            }
            trade.touch();
            info!(
                trade_id = %trade_id,
                filled_qty = %fill.filled_qty,
                fill_price = %fill.fill_price,
                "exit filled"
            );
            (broker_cancels, trade.status())
        };

        let persisted = self.persist(trade_id).await;
        if halted || !persisted {
            if !broker_cancels.is_empty() {
                error!(
                    trade_id = %trade_id,
                    "sibling broker cancels withheld pending manual review"
                );
            }
            return;
        }
        for broker_id in broker_cancels {
            self.executor.cancel(broker_id);
        }
        if trade_status == TradeStatus::Closed {
            info!(trade_id = %trade_id, "trade closed");
        }
    }

    async fn handle_executor_report(&mut self, report: ExecutionReport) {
        match report {
            ExecutionReport::Submitted {
                order_id,
                broker_order_id,
            } => {
                self.apply_submission_ack(&order_id, broker_order_id).await;
            }
            ExecutionReport::Rejected { order_id, reason } => {
                self.apply_rejection(&order_id, &reason).await;
            }
        }
    }

    async fn apply_submission_ack(&mut self, order_id: &OrderId, broker_order_id: BrokerOrderId) {
        let Some(trade_id) = self.registry.trade_for_order(order_id).cloned() else {
            warn!(order_id = %order_id, "submission ack for unknown order");
            return;
        };
        self.registry
            .link_broker_order(broker_order_id.clone(), trade_id.clone());

        let late_cancel = {
            let Some(trade) = self.registry.get_mut(&trade_id) else {
                return;
            };
            let trade_status = trade.status();
            let Some(order) = trade.order_mut(order_id) else {
                return;
            };
            order.broker_order_id = Some(broker_order_id.clone());

            let late_cancel = match order.status {
                // A user cancel or modify won the race against the placement
                // round-trip; the acknowledged order must be withdrawn.
                OrderStatus::Cancelled | OrderStatus::Inactive => true,
                OrderStatus::ContingentOrderSubmitted => {
                    match StatusValidator::validate(
                        trade_status,
                        order.status,
                        OrderStatus::ContingentOrderWorking,
                    ) {
                        Ok(()) => order.status = OrderStatus::ContingentOrderWorking,
                        Err(err) => error!(trade_id = %trade_id, %err, "working ack refused"),
                    }
                    false
                }
                _ => false,
            };
            trade.touch();
            late_cancel
        };

        self.persist(&trade_id).await;
        if late_cancel {
            warn!(
                order_id = %order_id,
                broker_order_id = %broker_order_id,
                "order was cancelled while placement was in flight; withdrawing at broker"
            );
            self.executor.cancel(broker_order_id.clone());
        }

        if let Some(fill) = self.pending_fills.remove(&broker_order_id) {
            debug!(broker_order_id = %broker_order_id, "replaying buffered fill");
            self.handle_fill(fill).await;
        }
    }

    async fn apply_rejection(&mut self, order_id: &OrderId, reason: &str) {
        let Some(trade_id) = self.registry.trade_for_order(order_id).cloned() else {
            warn!(order_id = %order_id, "rejection for unknown order");
            return;
        };
        {
            let Some(trade) = self.registry.get_mut(&trade_id) else {
                return;
            };
            let trade_status = trade.status();
            let Some(order) = trade.order_mut(order_id) else {
                return;
            };
            if let Err(err) =
                StatusValidator::validate(trade_status, order.status, OrderStatus::Rejected)
            {
                error!(trade_id = %trade_id, %err, "rejection transition refused");
                return;
            }
            order.status = OrderStatus::Rejected;
            let kind = order.kind;
            trade.touch();
            // Surfaced, never silently retried: a rejected exit leaves the
            // position exposed and needs a human.
            error!(
                trade_id = %trade_id,
                order_id = %order_id,
                kind = ?kind,
                %reason,
                "broker rejected order; manual review required"
            );
        }
        self.persist(&trade_id).await;
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    async fn handle_activate(
        &mut self,
        definition: TradeDefinition,
    ) -> Result<TradeId, ActivationError> {
        let errors = validation::validate(&definition);
        if !errors.is_empty() {
            return Err(ActivationError::Invalid(errors));
        }

        let mut trade = Trade::from_definition(&definition);
        if let Err(err) = StatusValidator::validate(
            trade.status(),
            trade.entry_order.status,
            OrderStatus::Working,
        ) {
            error!(%err, "activation transition refused");
            return Err(ActivationError::Stopped);
        }
        trade.entry_order.status = OrderStatus::Working;
        trade.touch();

        if let Err(err) = self.store.save(&trade).await {
            return Err(ActivationError::Persistence(err.to_string()));
        }

        let trade_id = trade.id.clone();
        info!(trade_id = %trade_id, symbol = %trade.symbol, "trade activated");
        self.registry.insert(trade);
        Ok(trade_id)
    }

    async fn handle_modify(
        &mut self,
        trade_id: &TradeId,
        changes: TradeChanges,
    ) -> Result<(), EngineError> {
        if changes.is_empty() {
            return Err(EngineError::InvalidChange("empty change set".to_string()));
        }
        if self.halted.contains(trade_id) {
            return Err(EngineError::TradeHalted(trade_id.clone()));
        }

        {
            let trade = self
                .registry
                .get_mut(trade_id)
                .ok_or_else(|| EngineError::TradeNotFound(trade_id.clone()))?;
            let trade_status = trade.status();
            if trade_status.is_terminal() {
                return Err(EngineError::TradeTerminal(trade_id.clone()));
            }

            if (changes.entry_trigger.is_some() || changes.quantity.is_some())
                && !trade.entry_order.status.is_virtual()
            {
                return Err(EngineError::InvalidChange(
                    "entry already submitted; trigger and quantity are frozen".to_string(),
                ));
            }

            let direction = trade.direction;
            if let Some(quantity) = changes.quantity {
                if quantity <= Decimal::ZERO {
                    return Err(EngineError::InvalidChange(
                        "quantity must be positive".to_string(),
                    ));
                }
                trade.quantity = quantity;
                trade.entry_order.requested_qty = quantity;
                for child in &mut trade.child_orders {
                    if child.status == OrderStatus::Draft {
                        child.requested_qty = quantity;
                    }
                }
            }
            if let Some(trigger) = changes.entry_trigger {
                let rule = OrderRule::Entry(entry_rule_for(direction, trigger));
                reprice_order(trade_status, &mut trade.entry_order, rule)?;
            }
            if let Some(stop) = changes.initial_stop {
                let rule = OrderRule::InitialStop(stop_rule_for(direction, stop));
                let child = trade.child_mut(OrderKind::InitialStop).ok_or_else(|| {
                    EngineError::InvalidChange("trade has no initial stop".to_string())
                })?;
                reprice_order(trade_status, child, rule)?;
            }
            if let Some(target) = changes.take_profit {
                let rule = OrderRule::TakeProfit(target_rule_for(direction, target));
                let child = trade.child_mut(OrderKind::TakeProfit).ok_or_else(|| {
                    EngineError::InvalidChange("trade has no take profit".to_string())
                })?;
                reprice_order(trade_status, child, rule)?;
            }
            trade.touch();
            info!(trade_id = %trade_id, "trade modified");
        }

        if self.persist(trade_id).await {
            Ok(())
        } else {
            Err(EngineError::TradeHalted(trade_id.clone()))
        }
    }

    async fn handle_cancel(&mut self, trade_id: &TradeId) -> Result<(), EngineError> {
        if self.halted.contains(trade_id) {
            return Err(EngineError::TradeHalted(trade_id.clone()));
        }

        let broker_cancels = {
            let trade = self
                .registry
                .get_mut(trade_id)
                .ok_or_else(|| EngineError::TradeNotFound(trade_id.clone()))?;
            let trade_status = trade.status();
            if trade_status.is_terminal() {
                return Err(EngineError::TradeTerminal(trade_id.clone()));
            }

            let mut broker_cancels: Vec<BrokerOrderId> = Vec::new();
            let mut cancel_order = |order: &mut Order| {
                if order.status.is_terminal() {
                    return;
                }
                match StatusValidator::validate_transition(order.status, OrderStatus::Cancelled) {
                    Ok(()) => {
                        if let Some(broker_id) = order.broker_order_id.clone() {
                            broker_cancels.push(broker_id);
                        }
                        order.status = OrderStatus::Cancelled;
                    }
                    Err(err) => error!(%err, "cancel transition refused"),
                }
            };
            cancel_order(&mut trade.entry_order);
            for child in &mut trade.child_orders {
                cancel_order(child);
            }
            trade.touch();

            if trade.status() == TradeStatus::Filled {
                warn!(
                    trade_id = %trade_id,
                    "exits withdrawn but position still open; trade remains Filled"
                );
            } else {
                info!(trade_id = %trade_id, "trade cancelled");
            }
            broker_cancels
        };

        if !self.persist(trade_id).await {
            return Err(EngineError::TradeHalted(trade_id.clone()));
        }
        for broker_id in broker_cancels {
            self.executor.cancel(broker_id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Persist a trade's current state; on failure the trade is halted.
    ///
    /// Returns false when the write failed. Callers must not issue broker
    /// calls for the trade after a false return.
    async fn persist(&mut self, trade_id: &TradeId) -> bool {
        let Some(trade) = self.registry.get(trade_id) else {
            return false;
        };
        match self.store.save(trade).await {
            Ok(()) => true,
            Err(err) => {
                error!(
                    trade_id = %trade_id,
                    %err,
                    "persistence failed; trade halted pending manual review"
                );
                self.halted.insert(trade_id.clone());
                false
            }
        }
    }

    /// Trades currently halted after persistence failures.
    #[must_use]
    pub fn halted(&self) -> &HashSet<TradeId> {
        &self.halted
    }
}

/// Suspend, reprice, and re-arm a virtual order.
///
/// Draft orders are repriced in place; Working orders go through
/// Inactive and back so the modify is visible as a validated transition.
fn reprice_order(
    trade_status: TradeStatus,
    order: &mut Order,
    rule: OrderRule,
) -> Result<(), EngineError> {
    match order.status {
        OrderStatus::Draft => {
            order.rule = rule;
            Ok(())
        }
        OrderStatus::Working | OrderStatus::Inactive => {
            if order.status == OrderStatus::Working {
                StatusValidator::validate(trade_status, order.status, OrderStatus::Inactive)?;
            }
            StatusValidator::validate(trade_status, OrderStatus::Inactive, OrderStatus::Working)?;
            order.rule = rule;
            order.status = OrderStatus::Working;
            Ok(())
        }
        other => Err(EngineError::InvalidChange(format!(
            "order already submitted ({other}); reprice refused"
        ))),
    }
}
