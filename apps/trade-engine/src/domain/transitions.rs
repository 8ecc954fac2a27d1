//! Order status state machine.
//!
//! Validates every status transition before it is applied. All mutation
//! sites (tick evaluation, fill callbacks, user actions, recovery) go
//! through [`StatusValidator`]; it is the single source of truth for
//! legality, independent of call site.

use thiserror::Error;

use super::status::{OrderStatus, TradeStatus};

/// Illegal status change requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The (from, to) pair is not in the transition table.
    #[error("illegal order transition {from} -> {to}: {reason}")]
    IllegalTransition {
        /// Status the order is in.
        from: OrderStatus,
        /// Status that was requested.
        to: OrderStatus,
        /// Human-readable refusal reason.
        reason: String,
    },

    /// The owning trade is already terminal; no further mutation allowed.
    #[error("trade is {trade_status}, order transition to {to} refused")]
    TradeTerminal {
        /// Terminal status of the owning trade.
        trade_status: TradeStatus,
        /// Status that was requested.
        to: OrderStatus,
    },
}

/// Order state machine for validating transitions.
pub struct StatusValidator;

impl StatusValidator {
    /// Check if a state transition is valid.
    #[must_use]
    pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            // From Draft: activation, or promotion when the entry fills
            (OrderStatus::Draft, OrderStatus::Working)
                | (OrderStatus::Draft, OrderStatus::Inactive)
                | (OrderStatus::Draft, OrderStatus::Cancelled)
                // From Working: trigger fires, user modify, or cancel
                | (OrderStatus::Working, OrderStatus::EntryOrderSubmitted)
                | (OrderStatus::Working, OrderStatus::ContingentOrderSubmitted)
                | (OrderStatus::Working, OrderStatus::Inactive)
                | (OrderStatus::Working, OrderStatus::Cancelled)
                // From Inactive: re-activation after modify, or cancel
                | (OrderStatus::Inactive, OrderStatus::Working)
                | (OrderStatus::Inactive, OrderStatus::Cancelled)
                // Entry path
                | (OrderStatus::EntryOrderSubmitted, OrderStatus::Filled)
                | (OrderStatus::EntryOrderSubmitted, OrderStatus::Rejected)
                | (OrderStatus::EntryOrderSubmitted, OrderStatus::Inactive)
                | (OrderStatus::EntryOrderSubmitted, OrderStatus::Cancelled)
                // Child path; a fill may arrive before the working ack
                | (OrderStatus::ContingentOrderSubmitted, OrderStatus::ContingentOrderWorking)
                | (OrderStatus::ContingentOrderSubmitted, OrderStatus::Filled)
                | (OrderStatus::ContingentOrderSubmitted, OrderStatus::Rejected)
                | (OrderStatus::ContingentOrderSubmitted, OrderStatus::Inactive)
                | (OrderStatus::ContingentOrderSubmitted, OrderStatus::Cancelled)
                | (OrderStatus::ContingentOrderWorking, OrderStatus::Filled)
                | (OrderStatus::ContingentOrderWorking, OrderStatus::Rejected)
                | (OrderStatus::ContingentOrderWorking, OrderStatus::Inactive)
                | (OrderStatus::ContingentOrderWorking, OrderStatus::Cancelled)
        )
    }

    /// Validate a state transition for an order belonging to a trade.
    ///
    /// Applies the terminal-state guard first: once the owning trade is
    /// Closed or Cancelled, every transition is refused regardless of the
    /// (from, to) pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the trade is terminal or the transition is not in
    /// the table.
    pub fn validate(
        trade_status: TradeStatus,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<(), TransitionError> {
        if trade_status.is_terminal() {
            return Err(TransitionError::TradeTerminal { trade_status, to });
        }
        Self::validate_transition(from, to)
    }

    /// Validate a state transition on its own.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not in the table.
    pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), TransitionError> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(TransitionError::IllegalTransition {
                from,
                to,
                reason: Self::refusal_reason(from, to),
            })
        }
    }

    /// Human-readable reason for an invalid transition.
    #[must_use]
    pub fn refusal_reason(from: OrderStatus, to: OrderStatus) -> String {
        match from {
            OrderStatus::Filled => format!("order is already filled, cannot transition to {to}"),
            OrderStatus::Cancelled => format!("order is cancelled, cannot transition to {to}"),
            OrderStatus::Rejected => format!("order was rejected, cannot transition to {to}"),
            _ => format!("no edge from {from} to {to} in the transition table"),
        }
    }

    /// All valid next states from a given state.
    #[must_use]
    pub fn valid_next_states(from: OrderStatus) -> Vec<OrderStatus> {
        use OrderStatus as S;
        match from {
            S::Draft => vec![S::Working, S::Inactive, S::Cancelled],
            S::Working => vec![
                S::EntryOrderSubmitted,
                S::ContingentOrderSubmitted,
                S::Inactive,
                S::Cancelled,
            ],
            S::Inactive => vec![S::Working, S::Cancelled],
            S::EntryOrderSubmitted => vec![S::Filled, S::Rejected, S::Inactive, S::Cancelled],
            S::ContingentOrderSubmitted => vec![
                S::ContingentOrderWorking,
                S::Filled,
                S::Rejected,
                S::Inactive,
                S::Cancelled,
            ],
            S::ContingentOrderWorking => vec![S::Filled, S::Rejected, S::Inactive, S::Cancelled],
            // Terminal states
            S::Filled | S::Cancelled | S::Rejected => vec![],
        }
    }
}
