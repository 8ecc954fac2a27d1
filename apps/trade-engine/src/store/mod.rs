//! Durable trade store.
//!
//! The store is the single shared mutable resource of the engine. Writes are
//! whole-record replaces so concurrent readers never observe a torn trade,
//! and the engine persists state *before* the corresponding broker call is
//! issued — any reader always sees the engine's intent.

pub mod json;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Trade, TradeId};

pub use json::JsonFileStore;
pub use memory::InMemoryStore;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem-level failure.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record failed to (de)serialize.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The referenced trade does not exist.
    #[error("trade not found: {0}")]
    NotFound(TradeId),
}

/// Port to the durable trade store.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Persist a trade as an atomic whole-record replace.
    async fn save(&self, trade: &Trade) -> Result<(), StoreError>;

    /// Load one trade by id.
    async fn get(&self, id: &TradeId) -> Result<Trade, StoreError>;

    /// Reload the full collection, used at process start for recovery.
    async fn load_all(&self) -> Result<Vec<Trade>, StoreError>;
}
