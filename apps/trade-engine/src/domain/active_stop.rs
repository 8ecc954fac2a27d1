//! Active-stop selection.
//!
//! At any instant exactly one stop is binding for an open position: the
//! tighter of the configured initial and trailing stops among the live
//! children. Recomputed on every tick, never persisted.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::OrderKind;
use super::status::OrderStatus;
use super::trade::{Direction, Trade};

/// The currently binding exit stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStop {
    /// Which stop kind is binding.
    pub kind: OrderKind,
    /// Its price level.
    pub price: Decimal,
}

/// Select the binding stop for a trade, if any stop child is live.
///
/// For a long trade the higher of the two levels is binding; for a short
/// trade the lower. On a tie the initial stop wins. Only stop children that
/// are still in play (working or transmitted but unresolved) participate.
#[must_use]
pub fn select_active_stop(trade: &Trade) -> Option<ActiveStop> {
    let initial = live_stop_level(trade, OrderKind::InitialStop);
    let trailing = live_stop_level(trade, OrderKind::TrailingStop);

    match (initial, trailing) {
        (Some(stop), Some(trail)) => {
            let trailing_tighter = match trade.direction {
                Direction::Long => trail > stop,
                Direction::Short => trail < stop,
            };
            if trailing_tighter {
                Some(ActiveStop {
                    kind: OrderKind::TrailingStop,
                    price: trail,
                })
            } else {
                Some(ActiveStop {
                    kind: OrderKind::InitialStop,
                    price: stop,
                })
            }
        }
        (Some(stop), None) => Some(ActiveStop {
            kind: OrderKind::InitialStop,
            price: stop,
        }),
        (None, Some(trail)) => Some(ActiveStop {
            kind: OrderKind::TrailingStop,
            price: trail,
        }),
        (None, None) => None,
    }
}

fn live_stop_level(trade: &Trade, kind: OrderKind) -> Option<Decimal> {
    let child = trade.child(kind)?;
    let live = matches!(
        child.status,
        OrderStatus::Working
            | OrderStatus::ContingentOrderSubmitted
            | OrderStatus::ContingentOrderWorking
    );
    if live { child.rule.stop_level() } else { None }
}
