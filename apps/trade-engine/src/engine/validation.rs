//! Activation validation.
//!
//! A definition is checked in full before it reaches the state machine; the
//! caller gets every reason at once, not just the first.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{Direction, TradeDefinition, TrailBy};

/// A reason an activation request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No symbol given.
    #[error("missing symbol")]
    MissingSymbol,

    /// Quantity must be positive.
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    /// Entry trigger must be positive.
    #[error("entry trigger must be positive, got {0}")]
    NonPositiveEntryTrigger(Decimal),

    /// Every trade needs a protective stop.
    #[error("missing initial stop")]
    MissingInitialStop,

    /// Stop level on the wrong side of the entry.
    #[error("initial stop {stop} is not protective for a {direction:?} entry at {entry}")]
    StopOnWrongSide {
        /// Configured stop level.
        stop: Decimal,
        /// Entry trigger level.
        entry: Decimal,
        /// Trade direction.
        direction: Direction,
    },

    /// Take-profit level on the wrong side of the entry.
    #[error("take profit {target} is not profitable for a {direction:?} entry at {entry}")]
    TargetOnWrongSide {
        /// Configured target level.
        target: Decimal,
        /// Entry trigger level.
        entry: Decimal,
        /// Trade direction.
        direction: Direction,
    },

    /// Trailing distance must be usable.
    #[error("invalid trailing distance")]
    InvalidTrailingDistance,
}

/// Validate a trade definition for activation.
///
/// Returns the full list of refusal reasons; an empty list means the
/// definition may be activated.
#[must_use]
pub fn validate(definition: &TradeDefinition) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if definition.symbol.trim().is_empty() {
        errors.push(ValidationError::MissingSymbol);
    }

    if definition.quantity <= Decimal::ZERO {
        errors.push(ValidationError::NonPositiveQuantity(definition.quantity));
    }

    if definition.entry_trigger <= Decimal::ZERO {
        errors.push(ValidationError::NonPositiveEntryTrigger(
            definition.entry_trigger,
        ));
    }

    match definition.initial_stop {
        None => errors.push(ValidationError::MissingInitialStop),
        Some(stop) => {
            let protective = match definition.direction {
                Direction::Long => stop < definition.entry_trigger,
                Direction::Short => stop > definition.entry_trigger,
            };
            if !protective {
                errors.push(ValidationError::StopOnWrongSide {
                    stop,
                    entry: definition.entry_trigger,
                    direction: definition.direction,
                });
            }
        }
    }

    if let Some(target) = definition.take_profit {
        let profitable = match definition.direction {
            Direction::Long => target > definition.entry_trigger,
            Direction::Short => target < definition.entry_trigger,
        };
        if !profitable {
            errors.push(ValidationError::TargetOnWrongSide {
                target,
                entry: definition.entry_trigger,
                direction: definition.direction,
            });
        }
    }

    if let Some(trail) = definition.trailing_stop {
        let usable = match trail {
            TrailBy::Percent(pct) => pct > Decimal::ZERO && pct < Decimal::ONE_HUNDRED,
            TrailBy::Amount(amount) => amount > Decimal::ZERO,
        };
        if !usable {
            errors.push(ValidationError::InvalidTrailingDistance);
        }
    }

    errors
}
