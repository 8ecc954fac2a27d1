//! Order and trade status in the lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order status across the virtual-to-broker lifecycle.
///
/// An order stays virtual (`Draft`, `Working`, `Inactive`) until its own
/// trigger fires; the `*Submitted`/`*Working` statuses exist only after the
/// engine has recorded the intent to transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order created but not yet activated for evaluation.
    Draft,
    /// Order active in the evaluation loop, still virtual.
    Working,
    /// Order suspended by a user modify; may return to Working.
    Inactive,
    /// Entry order handed to the executor, awaiting broker fill.
    EntryOrderSubmitted,
    /// Child (exit) order handed to the executor after its trigger fired.
    ContingentOrderSubmitted,
    /// Child order acknowledged live at the broker.
    ContingentOrderWorking,
    /// Order completely filled (broker-confirmed quantity).
    Filled,
    /// Order cancelled (explicit cancel or OCA loser).
    Cancelled,
    /// Order rejected by the broker.
    Rejected,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Returns true if the order has never been shown to the broker.
    ///
    /// Orders in these states must carry no `broker_order_id`.
    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        matches!(self, Self::Draft | Self::Working | Self::Inactive)
    }

    /// Returns true if the order has been handed to the executor and may be
    /// live at the broker.
    #[must_use]
    pub const fn is_submitted(&self) -> bool {
        matches!(
            self,
            Self::EntryOrderSubmitted | Self::ContingentOrderSubmitted | Self::ContingentOrderWorking
        )
    }

}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "DRAFT"),
            Self::Working => write!(f, "WORKING"),
            Self::Inactive => write!(f, "INACTIVE"),
            Self::EntryOrderSubmitted => write!(f, "ENTRY_ORDER_SUBMITTED"),
            Self::ContingentOrderSubmitted => write!(f, "CONTINGENT_ORDER_SUBMITTED"),
            Self::ContingentOrderWorking => write!(f, "CONTINGENT_ORDER_WORKING"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Trade status, derived from the statuses of the trade's orders.
///
/// Never stored independently; see `Trade::status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    /// Entry order still virtual; nothing at the broker.
    Blank,
    /// Entry order submitted, awaiting broker confirmation.
    Pending,
    /// Entry filled; position open, exits under evaluation.
    Filled,
    /// Position flat and every order resolved.
    Closed,
    /// Entry never filled and reached a terminal state.
    Cancelled,
}

impl TradeStatus {
    /// Returns true if no further evaluation occurs for the trade.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blank => write!(f, "--"),
            Self::Pending => write!(f, "PENDING"),
            Self::Filled => write!(f, "FILLED"),
            Self::Closed => write!(f, "CLOSED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}
