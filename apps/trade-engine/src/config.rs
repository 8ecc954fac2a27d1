//! Engine configuration.
//!
//! Layered loading: optional `trade-engine.toml` in the working directory,
//! overridden by `TRADE_ENGINE_*` environment variables. Every field has a
//! serde default so a missing file means default behavior, not a failure.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Recovery behavior on startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Reconcile persisted state against the broker blotter on startup.
    #[serde(default = "default_recovery_enabled")]
    pub enabled: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: default_recovery_enabled(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the persisted trade records.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Capacity of the manager's command mailbox.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Seconds between buying-power refreshes for the portfolio gate.
    #[serde(default = "default_portfolio_refresh_secs")]
    pub portfolio_refresh_secs: u64,

    /// Recovery section.
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            mailbox_capacity: default_mailbox_capacity(),
            portfolio_refresh_secs: default_portfolio_refresh_secs(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from file and environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or environment values fail to parse.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("trade-engine").required(false))
            .add_source(config::Environment::with_prefix("TRADE_ENGINE").separator("__"))
            .build()?
            .try_deserialize()
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/trades")
}

const fn default_mailbox_capacity() -> usize {
    256
}

const fn default_portfolio_refresh_secs() -> u64 {
    30
}

const fn default_recovery_enabled() -> bool {
    true
}
