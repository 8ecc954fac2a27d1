//! Trigger rules and their evaluation.
//!
//! A [`Rule`] is one condition of the form `primary OP secondary`. Each order
//! carries an [`OrderRule`], a closed set of variants (entry, initial stop,
//! trailing stop, take profit) that each hold only the fields they need and
//! evaluate against a [`MarketSnapshot`]. Evaluation is pure: no I/O, no
//! mutation, same snapshot in, same verdict out.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::OrderKind;
use super::trade::Direction;

/// Point-in-time market view handed to every evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Symbol the tick belongs to.
    pub symbol: String,
    /// Last traded price.
    pub price: Decimal,
    /// Tick timestamp.
    pub timestamp: DateTime<Utc>,
    /// Account buying power, when a portfolio view is available.
    pub buying_power: Option<Decimal>,
}

impl MarketSnapshot {
    /// Build a snapshot without portfolio context.
    #[must_use]
    pub fn new(symbol: impl Into<String>, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp,
            buying_power: None,
        }
    }
}

/// One side of a rule condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    /// The live tick price.
    LastPrice,
    /// A fixed price level.
    Constant(Decimal),
}

impl Source {
    const fn resolve(self, snapshot: &MarketSnapshot) -> Decimal {
        match self {
            Self::LastPrice => snapshot.price,
            Self::Constant(value) => value,
        }
    }
}

/// Comparison operator between the two rule sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparator {
    /// Primary >= secondary.
    Gte,
    /// Primary <= secondary.
    Lte,
    /// Primary > secondary.
    Gt,
    /// Primary < secondary.
    Lt,
}

/// A single `primary OP secondary` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Left-hand source.
    pub primary: Source,
    /// Operator.
    pub op: Comparator,
    /// Right-hand source.
    pub secondary: Source,
}

impl Rule {
    /// Rule that fires when the last price reaches or exceeds `level`.
    #[must_use]
    pub const fn price_at_or_above(level: Decimal) -> Self {
        Self {
            primary: Source::LastPrice,
            op: Comparator::Gte,
            secondary: Source::Constant(level),
        }
    }

    /// Rule that fires when the last price reaches or falls below `level`.
    #[must_use]
    pub const fn price_at_or_below(level: Decimal) -> Self {
        Self {
            primary: Source::LastPrice,
            op: Comparator::Lte,
            secondary: Source::Constant(level),
        }
    }

    /// Evaluate the condition against a snapshot.
    #[must_use]
    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> bool {
        let lhs = self.primary.resolve(snapshot);
        let rhs = self.secondary.resolve(snapshot);
        match self.op {
            Comparator::Gte => lhs >= rhs,
            Comparator::Lte => lhs <= rhs,
            Comparator::Gt => lhs > rhs,
            Comparator::Lt => lhs < rhs,
        }
    }

    /// The fixed level of the rule, when one side is a constant.
    #[must_use]
    pub const fn constant_level(&self) -> Option<Decimal> {
        match (self.primary, self.secondary) {
            (Source::Constant(value), _) | (_, Source::Constant(value)) => Some(value),
            _ => None,
        }
    }
}

/// Trail distance for a trailing stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrailBy {
    /// Percent of the anchor price, e.g. `2` trails 2% behind the extreme.
    Percent(Decimal),
    /// Absolute price distance behind the extreme.
    Amount(Decimal),
}

/// Trailing stop rule with ratchet state.
///
/// The anchor tracks the best price seen since entry (high-water for long,
/// low-water for short); the stop level trails it by the configured distance
/// and only ever moves in the conservative direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingRule {
    /// Configured trail distance.
    pub trail: TrailBy,
    /// Best price seen since the position opened.
    pub anchor: Option<Decimal>,
    /// Current stop level derived from the anchor.
    pub level: Option<Decimal>,
}

impl TrailingRule {
    /// Create an un-anchored trailing rule.
    #[must_use]
    pub const fn new(trail: TrailBy) -> Self {
        Self {
            trail,
            anchor: None,
            level: None,
        }
    }

    /// Feed a new price into the ratchet.
    ///
    /// Re-anchors on a new extreme and recomputes the level. The level only
    /// tightens: up for long trades, down for short trades. Returns the new
    /// level when it moved.
    pub fn observe(&mut self, direction: Direction, price: Decimal) -> Option<Decimal> {
        let improved = match (direction, self.anchor) {
            (_, None) => true,
            (Direction::Long, Some(anchor)) => price > anchor,
            (Direction::Short, Some(anchor)) => price < anchor,
        };
        if !improved {
            return None;
        }

        self.anchor = Some(price);
        let candidate = self.level_for(direction, price);
        let tightened = match (direction, self.level) {
            (_, None) => true,
            (Direction::Long, Some(level)) => candidate > level,
            (Direction::Short, Some(level)) => candidate < level,
        };
        if tightened {
            self.level = Some(candidate);
            Some(candidate)
        } else {
            None
        }
    }

    /// Whether the current price has crossed the trailing level.
    #[must_use]
    pub fn triggered(&self, direction: Direction, price: Decimal) -> bool {
        match (direction, self.level) {
            (_, None) => false,
            (Direction::Long, Some(level)) => price <= level,
            (Direction::Short, Some(level)) => price >= level,
        }
    }

    fn level_for(&self, direction: Direction, anchor: Decimal) -> Decimal {
        let distance = match self.trail {
            TrailBy::Percent(pct) => anchor * pct / Decimal::ONE_HUNDRED,
            TrailBy::Amount(amount) => amount,
        };
        match direction {
            Direction::Long => anchor - distance,
            Direction::Short => anchor + distance,
        }
    }
}

/// Defining condition of an order, one variant per order kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderRule {
    /// Opens the position when the condition fires.
    Entry(Rule),
    /// Static protective stop.
    InitialStop(Rule),
    /// Ratcheting stop trailing the best price since entry.
    TrailingStop(TrailingRule),
    /// Profit target.
    TakeProfit(Rule),
}

impl OrderRule {
    /// The order kind this rule defines.
    #[must_use]
    pub const fn kind(&self) -> OrderKind {
        match self {
            Self::Entry(_) => OrderKind::Entry,
            Self::InitialStop(_) => OrderKind::InitialStop,
            Self::TrailingStop(_) => OrderKind::TrailingStop,
            Self::TakeProfit(_) => OrderKind::TakeProfit,
        }
    }

    /// Evaluate whether the rule has triggered for a trade of `direction`.
    #[must_use]
    pub fn evaluate(&self, direction: Direction, snapshot: &MarketSnapshot) -> bool {
        match self {
            Self::Entry(rule) | Self::InitialStop(rule) | Self::TakeProfit(rule) => {
                rule.evaluate(snapshot)
            }
            Self::TrailingStop(trailing) => trailing.triggered(direction, snapshot.price),
        }
    }

    /// The stop level this rule currently enforces, if it is a stop.
    #[must_use]
    pub const fn stop_level(&self) -> Option<Decimal> {
        match self {
            Self::InitialStop(rule) => rule.constant_level(),
            Self::TrailingStop(trailing) => trailing.level,
            Self::Entry(_) | Self::TakeProfit(_) => None,
        }
    }
}

/// Portfolio-level gate applied before entry submission.
///
/// The engine enforces a single buying-power threshold; anything richer is a
/// portfolio concern outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PortfolioFilter {
    /// Buying power that must remain free after the entry would fill.
    pub reserve: Decimal,
}

impl PortfolioFilter {
    /// Whether an entry requiring `notional` may be submitted.
    ///
    /// A snapshot without portfolio context passes the filter; the caller
    /// decides whether to treat missing data as a warning.
    #[must_use]
    pub fn allows(&self, notional: Decimal, snapshot: &MarketSnapshot) -> bool {
        match snapshot.buying_power {
            Some(buying_power) => notional + self.reserve <= buying_power,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snap(price: Decimal) -> MarketSnapshot {
        MarketSnapshot::new(
            "AAPL",
            price,
            Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap(),
        )
    }

    #[test]
    fn price_at_or_above_fires_on_cross() {
        let rule = Rule::price_at_or_above(Decimal::new(150, 0));
        assert!(!rule.evaluate(&snap(Decimal::new(14999, 2))));
        assert!(rule.evaluate(&snap(Decimal::new(150, 0))));
        assert!(rule.evaluate(&snap(Decimal::new(151, 0))));
    }

    #[test]
    fn price_at_or_below_fires_on_cross() {
        let rule = Rule::price_at_or_below(Decimal::new(140, 0));
        assert!(!rule.evaluate(&snap(Decimal::new(141, 0))));
        assert!(rule.evaluate(&snap(Decimal::new(140, 0))));
        assert!(rule.evaluate(&snap(Decimal::new(135, 0))));
    }

    #[test]
    fn strict_comparators() {
        let gt = Rule {
            primary: Source::LastPrice,
            op: Comparator::Gt,
            secondary: Source::Constant(Decimal::new(100, 0)),
        };
        assert!(!gt.evaluate(&snap(Decimal::new(100, 0))));
        assert!(gt.evaluate(&snap(Decimal::new(101, 0))));

        let lt = Rule {
            primary: Source::LastPrice,
            op: Comparator::Lt,
            secondary: Source::Constant(Decimal::new(100, 0)),
        };
        assert!(!lt.evaluate(&snap(Decimal::new(100, 0))));
        assert!(lt.evaluate(&snap(Decimal::new(99, 0))));
    }

    #[test]
    fn trailing_ratchet_long_only_tightens_upward() {
        let mut trailing = TrailingRule::new(TrailBy::Percent(Decimal::new(2, 0)));

        // First observation anchors and sets the level 2% below.
        let level = trailing.observe(Direction::Long, Decimal::new(100, 0));
        assert_eq!(level, Some(Decimal::new(98, 0)));

        // Lower price: no re-anchor, no level move.
        assert_eq!(trailing.observe(Direction::Long, Decimal::new(95, 0)), None);
        assert_eq!(trailing.level, Some(Decimal::new(98, 0)));

        // New high ratchets the level up.
        let level = trailing.observe(Direction::Long, Decimal::new(110, 0));
        assert_eq!(level, Some(Decimal::new(1078, 1)));
        assert_eq!(trailing.anchor, Some(Decimal::new(110, 0)));
    }

    #[test]
    fn trailing_ratchet_short_only_tightens_downward() {
        let mut trailing = TrailingRule::new(TrailBy::Amount(Decimal::new(5, 0)));

        let level = trailing.observe(Direction::Short, Decimal::new(200, 0));
        assert_eq!(level, Some(Decimal::new(205, 0)));

        // Price rising is adverse for a short: nothing moves.
        assert_eq!(
            trailing.observe(Direction::Short, Decimal::new(210, 0)),
            None
        );
        assert_eq!(trailing.level, Some(Decimal::new(205, 0)));

        let level = trailing.observe(Direction::Short, Decimal::new(190, 0));
        assert_eq!(level, Some(Decimal::new(195, 0)));
    }

    #[test]
    fn trailing_trigger_respects_direction() {
        let mut trailing = TrailingRule::new(TrailBy::Amount(Decimal::new(2, 0)));
        trailing.observe(Direction::Long, Decimal::new(150, 0));

        assert!(!trailing.triggered(Direction::Long, Decimal::new(149, 0)));
        assert!(trailing.triggered(Direction::Long, Decimal::new(148, 0)));
        assert!(trailing.triggered(Direction::Long, Decimal::new(147, 0)));
    }

    #[test]
    fn unanchored_trailing_never_triggers() {
        let trailing = TrailingRule::new(TrailBy::Percent(Decimal::new(2, 0)));
        assert!(!trailing.triggered(Direction::Long, Decimal::new(1, 0)));
    }

    #[test]
    fn order_rule_kind_mapping() {
        let rule = Rule::price_at_or_above(Decimal::new(150, 0));
        assert_eq!(OrderRule::Entry(rule).kind(), OrderKind::Entry);
        assert_eq!(OrderRule::InitialStop(rule).kind(), OrderKind::InitialStop);
        assert_eq!(OrderRule::TakeProfit(rule).kind(), OrderKind::TakeProfit);
        assert_eq!(
            OrderRule::TrailingStop(TrailingRule::new(TrailBy::Amount(Decimal::ONE))).kind(),
            OrderKind::TrailingStop
        );
    }

    #[test]
    fn portfolio_filter_enforces_threshold() {
        let filter = PortfolioFilter {
            reserve: Decimal::new(1000, 0),
        };
        let mut snapshot = snap(Decimal::new(150, 0));
        snapshot.buying_power = Some(Decimal::new(16000, 0));

        assert!(filter.allows(Decimal::new(15000, 0), &snapshot));
        assert!(!filter.allows(Decimal::new(15001, 0), &snapshot));
    }

    #[test]
    fn portfolio_filter_passes_without_portfolio_view() {
        let filter = PortfolioFilter::default();
        assert!(filter.allows(Decimal::new(1_000_000, 0), &snap(Decimal::new(150, 0))));
    }

    #[test]
    fn order_rule_serde_round_trip() {
        let rule = OrderRule::TrailingStop(TrailingRule {
            trail: TrailBy::Percent(Decimal::new(2, 0)),
            anchor: Some(Decimal::new(110, 0)),
            level: Some(Decimal::new(1078, 1)),
        });
        let json = serde_json::to_string(&rule).unwrap();
        let parsed: OrderRule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rule);
    }
}
