//! File-backed trade store.
//!
//! One JSON document per trade under a data directory. Replaces go through a
//! temp file followed by a rename, so a crash mid-write leaves the previous
//! record intact and a reader never sees a half-written trade.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::{Trade, TradeId};

use super::{StoreError, TradeStore};

/// JSON-file trade store.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: &TradeId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn read_record(path: &Path) -> Result<Trade, StoreError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl TradeStore for JsonFileStore {
    async fn save(&self, trade: &Trade) -> Result<(), StoreError> {
        let path = self.record_path(&trade.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(trade)?;

        let blocking_tmp = tmp.clone();
        let blocking_path = path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            std::fs::write(&blocking_tmp, &bytes)?;
            std::fs::rename(&blocking_tmp, &blocking_path)?;
            Ok(())
        })
        .await
        .map_err(|join_err| StoreError::Io(std::io::Error::other(join_err)))??;

        debug!(trade_id = %trade.id, "trade persisted");
        Ok(())
    }

    async fn get(&self, id: &TradeId) -> Result<Trade, StoreError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.clone()));
        }
        tokio::task::spawn_blocking(move || Self::read_record(&path))
            .await
            .map_err(|join_err| StoreError::Io(std::io::Error::other(join_err)))?
    }

    async fn load_all(&self) -> Result<Vec<Trade>, StoreError> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Trade>, StoreError> {
            let mut trades = Vec::new();
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                trades.push(Self::read_record(&path)?);
            }
            Ok(trades)
        })
        .await
        .map_err(|join_err| StoreError::Io(std::io::Error::other(join_err)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, TradeDefinition};
    use rust_decimal::Decimal;

    fn definition(symbol: &str) -> TradeDefinition {
        TradeDefinition {
            symbol: symbol.to_string(),
            direction: Direction::Long,
            quantity: Decimal::new(100, 0),
            entry_trigger: Decimal::new(150, 0),
            initial_stop: Some(Decimal::new(140, 0)),
            trailing_stop: None,
            take_profit: Some(Decimal::new(180, 0)),
            portfolio_filter: None,
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        let trade = Trade::from_definition(&definition("AAPL"));
        store.save(&trade).await.unwrap();

        let loaded = store.get(&trade.id).await.unwrap();
        assert_eq!(loaded, trade);
    }

    #[tokio::test]
    async fn save_replaces_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        let mut trade = Trade::from_definition(&definition("AAPL"));
        store.save(&trade).await.unwrap();

        trade.filled_quantity = Decimal::new(60, 0);
        store.save(&trade).await.unwrap();

        let loaded = store.get(&trade.id).await.unwrap();
        assert_eq!(loaded.filled_quantity, Decimal::new(60, 0));
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn load_all_returns_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        store
            .save(&Trade::from_definition(&definition("AAPL")))
            .await
            .unwrap();
        store
            .save(&Trade::from_definition(&definition("MSFT")))
            .await
            .unwrap();

        let mut symbols: Vec<String> = store
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|trade| trade.symbol)
            .collect();
        symbols.sort();
        assert_eq!(symbols, vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[tokio::test]
    async fn get_missing_trade_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        let err = store.get(&TradeId::new("missing")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn leftover_tmp_files_are_ignored_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        let trade = Trade::from_definition(&definition("AAPL"));
        store.save(&trade).await.unwrap();
        std::fs::write(dir.path().join("orphan.json.tmp"), b"{").unwrap();

        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }
}
