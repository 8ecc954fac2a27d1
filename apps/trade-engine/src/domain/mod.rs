//! Core domain: statuses, transitions, rules, orders, trades.
//!
//! Everything in this module is pure — no I/O, no clocks beyond creation
//! timestamps, no broker knowledge. The engine layer drives it.

pub mod active_stop;
pub mod ids;
pub mod order;
pub mod rule;
pub mod status;
pub mod trade;
pub mod transitions;

pub use active_stop::{ActiveStop, select_active_stop};
pub use ids::{BrokerOrderId, OcaGroupId, OrderId, TradeId};
pub use order::{Order, OrderKind, OrderSide};
pub use rule::{
    Comparator, MarketSnapshot, OrderRule, PortfolioFilter, Rule, Source, TrailBy, TrailingRule,
};
pub use status::{OrderStatus, TradeStatus};
pub use trade::{Direction, Trade, TradeChanges, TradeDefinition, TradeView};
pub use transitions::{StatusValidator, TransitionError};
