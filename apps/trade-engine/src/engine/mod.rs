//! Engine layer: manager actor, executor, registry, recovery, handle.

pub mod executor;
pub mod handle;
pub mod manager;
pub mod recovery;
pub mod registry;
pub mod validation;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::broker::BrokerAdapter;
use crate::config::EngineConfig;
use crate::store::TradeStore;

pub use executor::{ExecutionReport, OrderExecutor};
pub use handle::{EngineHandle, StaleDataError, TickError};
pub use manager::{ActivationError, EngineCommand, EngineError, TradeManager};
pub use recovery::{Discrepancy, RecoveryError, RecoveryReport};
pub use registry::TradeRegistry;
pub use validation::ValidationError;

/// A running engine: manager actor plus its supporting tasks.
pub struct Engine {
    handle: EngineHandle,
    manager_task: JoinHandle<()>,
    fill_pump: JoinHandle<()>,
    portfolio_refresher: JoinHandle<()>,
}

impl Engine {
    /// Recover persisted state, reconcile it against the broker, and start
    /// the manager actor.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker session cannot be established or
    /// recovery fails.
    pub async fn start(
        config: EngineConfig,
        store: Arc<dyn TradeStore>,
        broker: Arc<dyn BrokerAdapter>,
    ) -> Result<(Self, RecoveryReport), RecoveryError> {
        broker.connect().await?;

        let (trades, report) = if config.recovery.enabled {
            recovery::recover(store.as_ref(), broker.as_ref()).await?
        } else {
            warn!("startup recovery disabled; trusting persisted state as-is");
            (store.load_all().await?, RecoveryReport::default())
        };
        if !report.clean() {
            warn!(
                flagged = report.orders_flagged,
                "recovery flagged orders for manual review"
            );
        }

        let registry = TradeRegistry::from_trades(trades);
        let (mailbox_tx, mailbox_rx) = mpsc::channel(config.mailbox_capacity);

        let executor = OrderExecutor::new(Arc::clone(&broker), mailbox_tx.clone());
        let fill_pump = executor.spawn_fill_pump();
        let portfolio_refresher = spawn_portfolio_refresher(
            Arc::clone(&broker),
            mailbox_tx.clone(),
            config.portfolio_refresh_secs,
        );

        let manager = TradeManager::new(registry, store, executor);
        let manager_task = tokio::spawn(manager.run(mailbox_rx));

        info!("engine started");
        Ok((
            Self {
                handle: EngineHandle::new(mailbox_tx),
                manager_task,
                fill_pump,
                portfolio_refresher,
            },
            report,
        ))
    }

    /// Clonable handle for the surrounding application.
    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Stop the manager and its supporting tasks.
    pub async fn shutdown(self) {
        self.handle.shutdown().await;
        let _ = self.manager_task.await;
        self.fill_pump.abort();
        self.portfolio_refresher.abort();
        info!("engine shut down");
    }
}

/// Periodically refresh the cached buying power used by the portfolio gate.
///
/// The tick path must never block on broker I/O, so the gate evaluates a
/// cached value fed through the mailbox like every other input.
fn spawn_portfolio_refresher(
    broker: Arc<dyn BrokerAdapter>,
    mailbox: mpsc::Sender<EngineCommand>,
    refresh_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(refresh_secs.max(1)));
        loop {
            interval.tick().await;
            match broker.get_buying_power().await {
                Ok(buying_power) => {
                    if mailbox
                        .send(EngineCommand::PortfolioUpdate { buying_power })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(err) => warn!(%err, "buying-power refresh failed"),
            }
        }
    })
}
