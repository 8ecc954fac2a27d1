//! In-memory trade store for tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::{Trade, TradeId};

use super::{StoreError, TradeStore};

/// Map-backed store with the same replace semantics as the file store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    trades: RwLock<HashMap<TradeId, Trade>>,
    fail_saves: RwLock<bool>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail, to exercise persistence-halt paths.
    pub fn fail_saves(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_saves.write() {
            *flag = fail;
        }
    }

    /// Number of stored trades.
    #[must_use]
    pub fn count(&self) -> usize {
        self.trades.read().map(|trades| trades.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TradeStore for InMemoryStore {
    async fn save(&self, trade: &Trade) -> Result<(), StoreError> {
        if self.fail_saves.read().map(|flag| *flag).unwrap_or(false) {
            return Err(StoreError::Io(std::io::Error::other(
                "simulated persistence failure",
            )));
        }
        if let Ok(mut trades) = self.trades.write() {
            trades.insert(trade.id.clone(), trade.clone());
        }
        Ok(())
    }

    async fn get(&self, id: &TradeId) -> Result<Trade, StoreError> {
        self.trades
            .read()
            .ok()
            .and_then(|trades| trades.get(id).cloned())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn load_all(&self) -> Result<Vec<Trade>, StoreError> {
        Ok(self
            .trades
            .read()
            .map(|trades| trades.values().cloned().collect())
            .unwrap_or_default())
    }
}
