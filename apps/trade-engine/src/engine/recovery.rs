//! Startup recovery and broker reconciliation.
//!
//! The engine persists intent before calling the broker, so after a crash the
//! store may claim submissions the broker never received. Recovery treats
//! every persisted "submitted" status as a claim to verify against the
//! broker's own blotter: orders the broker does not confirm are marked
//! Rejected pending manual review — never assumed filled, never retried.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::broker::{BrokerAdapter, BrokerError, Position};
use crate::domain::{BrokerOrderId, OrderId, OrderStatus, StatusValidator, Trade, TradeId};
use crate::store::{StoreError, TradeStore};

/// Errors from the recovery routine.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// Store failure while reloading or re-persisting.
    #[error("recovery store error: {0}")]
    Store(#[from] StoreError),

    /// Broker failure while fetching the blotter.
    #[error("recovery broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// A mismatch between persisted intent and broker state.
#[derive(Debug, Clone, Serialize)]
pub struct Discrepancy {
    /// Trade owning the order.
    pub trade_id: TradeId,
    /// The order in question.
    pub order_id: OrderId,
    /// Status the store claimed.
    pub local_status: OrderStatus,
    /// What the broker reports.
    pub broker_state: String,
    /// Resolution applied.
    pub action: String,
    /// Detection time.
    pub detected_at: DateTime<Utc>,
}

/// Outcome of a recovery run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    /// Trades reloaded from the store.
    pub trades_loaded: usize,
    /// Orders flagged for manual review.
    pub orders_flagged: usize,
    /// Detected discrepancies.
    pub discrepancies: Vec<Discrepancy>,
}

impl RecoveryReport {
    /// Whether the recovered state matched the broker exactly.
    #[must_use]
    pub fn clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Reload the full trade collection and reconcile it against the broker.
///
/// Returns the (possibly amended) trades ready for the registry plus a
/// report of everything that was flagged.
///
/// # Errors
///
/// Returns an error if the store cannot be read or re-written, or the broker
/// blotter cannot be fetched.
pub async fn recover(
    store: &dyn TradeStore,
    broker: &dyn BrokerAdapter,
) -> Result<(Vec<Trade>, RecoveryReport), RecoveryError> {
    let mut trades = store.load_all().await?;
    let open_orders: HashSet<BrokerOrderId> = broker
        .get_open_orders()
        .await?
        .into_iter()
        .map(|order| order.broker_order_id)
        .collect();
    let positions: HashMap<String, Position> = broker
        .get_positions()
        .await?
        .into_iter()
        .map(|position| (position.symbol.clone(), position))
        .collect();

    let mut report = RecoveryReport {
        trades_loaded: trades.len(),
        ..RecoveryReport::default()
    };

    for trade in &mut trades {
        let trade_status = trade.status();
        if trade_status.is_terminal() {
            continue;
        }
        let trade_id = trade.id.clone();
        let symbol = trade.symbol.clone();
        let mut changed = false;

        let orders = std::iter::once(&mut trade.entry_order).chain(trade.child_orders.iter_mut());
        for order in orders {
            if !order.status.is_submitted() {
                continue;
            }
            let confirmed = order
                .broker_order_id
                .as_ref()
                .is_some_and(|id| open_orders.contains(id));
            if confirmed {
                continue;
            }

            let broker_state = match (&order.broker_order_id, positions.get(&symbol)) {
                (None, _) => "submission never acknowledged".to_string(),
                (Some(id), Some(position)) => format!(
                    "{id} not in open-order blotter; broker reports {} {} @ {}",
                    position.quantity, symbol, position.avg_price
                ),
                (Some(id), None) => format!("{id} not in open-order blotter, no position"),
            };

            match StatusValidator::validate(trade_status, order.status, OrderStatus::Rejected) {
                Ok(()) => {
                    warn!(
                        trade_id = %trade_id,
                        order_id = %order.order_id,
                        local_status = %order.status,
                        %broker_state,
                        "persisted submission unconfirmed; marked Rejected pending manual review"
                    );
                    report.discrepancies.push(Discrepancy {
                        trade_id: trade_id.clone(),
                        order_id: order.order_id.clone(),
                        local_status: order.status,
                        broker_state,
                        action: "marked Rejected pending manual review".to_string(),
                        detected_at: Utc::now(),
                    });
                    order.status = OrderStatus::Rejected;
                    report.orders_flagged += 1;
                    changed = true;
                }
                Err(err) => {
                    error!(trade_id = %trade_id, %err, "reconciliation transition refused");
                }
            }
        }

        if changed {
            trade.touch();
            store.save(trade).await?;
        }
    }

    info!(
        trades = report.trades_loaded,
        flagged = report.orders_flagged,
        "recovery complete"
    );
    Ok((trades, report))
}
