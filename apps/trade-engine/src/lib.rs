// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Trade Engine - Rust Core Library
//!
//! Tick-driven trade lifecycle engine for the Sentry trading system.
//!
//! # Architecture
//!
//! - **Domain**: pure types and logic
//!   - `domain::status` / `domain::transitions`: the order and trade state
//!     machines with a single validator for every mutation site
//!   - `domain::rule`: trigger conditions, trailing-stop ratchet, the
//!     buying-power gate
//!   - `domain::trade` / `domain::order`: the persisted aggregate; trade
//!     status is derived, never stored
//!   - `domain::active_stop`: per-tick selection of the binding stop
//!
//! - **Engine**: orchestration
//!   - `engine::manager`: single-threaded actor draining a mailbox of ticks,
//!     fills, executor reports, and user actions; persists state before
//!     every broker call and enforces OCA cancellation
//!   - `engine::executor`: one broker command per triggered order, placed on
//!     its own task; fills pumped back into the mailbox
//!   - `engine::recovery`: startup reconciliation against the broker blotter
//!   - `engine::handle`: the facade exposed to the surrounding application
//!
//! - **Boundaries**
//!   - `broker`: the adapter trait; only single immediate-execution commands
//!     ever cross it
//!   - `store`: atomic whole-record persistence with full reload at startup

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod broker;
pub mod config;
pub mod domain;
pub mod engine;
pub mod store;
pub mod telemetry;

pub use broker::{BrokerAdapter, BrokerError, FillEvent, MockBrokerAdapter, OrderTicket};
pub use config::EngineConfig;
pub use domain::{
    ActiveStop, Direction, MarketSnapshot, Order, OrderKind, OrderRule, OrderSide, OrderStatus,
    Rule, StatusValidator, TrailBy, Trade, TradeChanges, TradeDefinition, TradeId, TradeStatus,
    TradeView, TransitionError,
};
pub use engine::{
    ActivationError, Engine, EngineError, EngineHandle, RecoveryReport, StaleDataError, TickError,
    ValidationError,
};
pub use store::{InMemoryStore, JsonFileStore, TradeStore};
pub use telemetry::init_telemetry;
