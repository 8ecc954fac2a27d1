//! Strongly-typed identifiers for domain entities.
//!
//! These prevent mixing up IDs from different contexts.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate a new unique identifier using UUID v4.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(TradeId, "Unique identifier for a trade aggregate.");
define_id!(OrderId, "Unique identifier for an order (engine internal).");
define_id!(BrokerOrderId, "Broker's unique identifier for a transmitted order.");
define_id!(
    OcaGroupId,
    "Grouping key shared by sibling exit orders of one trade."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_new_and_display() {
        let id = OrderId::new("ord-123");
        assert_eq!(id.as_str(), "ord-123");
        assert_eq!(format!("{id}"), "ord-123");
    }

    #[test]
    fn order_id_generate_is_unique() {
        let id1 = OrderId::generate();
        let id2 = OrderId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn trade_id_from_string() {
        let id: TradeId = "trade-1".into();
        assert_eq!(id.as_str(), "trade-1");

        let id: TradeId = String::from("trade-2").into();
        assert_eq!(id.as_str(), "trade-2");
    }

    #[test]
    fn oca_group_id_equality() {
        let a = OcaGroupId::new("oca-1");
        let b = OcaGroupId::new("oca-1");
        let c = OcaGroupId::new("oca-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn id_serde_is_transparent() {
        let id = BrokerOrderId::new("brk-7");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"brk-7\"");

        let parsed: BrokerOrderId = serde_json::from_str("\"brk-7\"").unwrap();
        assert_eq!(parsed, id);
    }
}
