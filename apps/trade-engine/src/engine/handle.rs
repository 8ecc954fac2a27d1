//! Engine handle: the surface exposed to the surrounding application.
//!
//! A cheap clonable facade over the manager's mailbox. The UI/API layer and
//! the market-data callback both talk to the engine exclusively through this
//! type; nothing else can reach the registry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::domain::{TradeChanges, TradeDefinition, TradeId, TradeView};

use super::manager::{ActivationError, EngineCommand, EngineError};

/// A tick that cannot be evaluated and was dropped without state change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stale tick for {symbol}: {reason}")]
pub struct StaleDataError {
    /// Symbol of the offending tick.
    pub symbol: String,
    /// Why it was dropped.
    pub reason: String,
}

/// Failure to deliver a tick into the engine.
#[derive(Debug, Error)]
pub enum TickError {
    /// The tick itself was unusable; nothing changed.
    #[error(transparent)]
    Stale(#[from] StaleDataError),

    /// The engine is no longer running.
    #[error("engine stopped")]
    Stopped,
}

/// Handle to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    mailbox: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub(crate) fn new(mailbox: mpsc::Sender<EngineCommand>) -> Self {
        Self { mailbox }
    }

    /// Validate and activate a trade definition.
    ///
    /// # Errors
    ///
    /// Returns every validation reason on refusal, or a persistence error if
    /// the accepted trade could not be made durable.
    pub async fn activate(&self, definition: TradeDefinition) -> Result<TradeId, ActivationError> {
        let (reply, rx) = oneshot::channel();
        self.mailbox
            .send(EngineCommand::Activate { definition, reply })
            .await
            .map_err(|_| ActivationError::Stopped)?;
        rx.await.map_err(|_| ActivationError::Stopped)?
    }

    /// Apply user changes to a live trade.
    pub async fn modify(&self, trade_id: TradeId, changes: TradeChanges) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.mailbox
            .send(EngineCommand::Modify {
                trade_id,
                changes,
                reply,
            })
            .await
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)?
    }

    /// Cancel a trade's remaining orders.
    pub async fn cancel(&self, trade_id: TradeId) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.mailbox
            .send(EngineCommand::Cancel { trade_id, reply })
            .await
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)?
    }

    /// Read-only projection of a trade, including the derived active stop.
    pub async fn get_trade(&self, trade_id: TradeId) -> Result<Option<TradeView>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.mailbox
            .send(EngineCommand::GetTrade { trade_id, reply })
            .await
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Deliver a price tick.
    ///
    /// Non-finite prices are refused here; out-of-order ticks are dropped
    /// inside the manager. Either way a bad tick causes no state change.
    ///
    /// # Errors
    ///
    /// Returns [`TickError::Stale`] for unusable prices and
    /// [`TickError::Stopped`] when the engine is gone.
    pub async fn on_tick(
        &self,
        symbol: &str,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), TickError> {
        let price = Decimal::from_f64(price).ok_or_else(|| StaleDataError {
            symbol: symbol.to_string(),
            reason: format!("non-numeric price {price}"),
        })?;
        if price <= Decimal::ZERO {
            return Err(TickError::Stale(StaleDataError {
                symbol: symbol.to_string(),
                reason: format!("non-positive price {price}"),
            }));
        }
        self.mailbox
            .send(EngineCommand::Tick {
                symbol: symbol.to_string(),
                price,
                timestamp,
            })
            .await
            .map_err(|_| TickError::Stopped)
    }

    /// Deliver a tick with an already-validated decimal price.
    pub async fn on_tick_decimal(
        &self,
        symbol: &str,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<(), TickError> {
        self.mailbox
            .send(EngineCommand::Tick {
                symbol: symbol.to_string(),
                price,
                timestamp,
            })
            .await
            .map_err(|_| TickError::Stopped)
    }

    /// Ask the manager to stop.
    pub async fn shutdown(&self) {
        let _ = self.mailbox.send(EngineCommand::Shutdown).await;
    }
}
