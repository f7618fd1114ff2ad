//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing an `AccountId` where a
//! `StatementId` is expected. Both are the integer keys handed out by the
//! configuration store.

use serde::{Deserialize, Serialize};

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Creates an ID from its raw store key.
            #[must_use]
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// Returns the raw store key.
            #[must_use]
            pub const fn into_inner(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }
    };
}

typed_id!(
    StatementId,
    "Unique identifier for a statement type (one DRE layout)."
);
typed_id!(
    AccountId,
    "Unique identifier for a chart of accounts entry."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let id = AccountId::new(101);
        assert_eq!(id.to_string(), "101");
        assert_eq!(" 101 ".parse::<AccountId>().unwrap(), id);
        assert!("abc".parse::<AccountId>().is_err());
    }

    #[test]
    fn test_serde_transparent() {
        let id = StatementId::from(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        let back: StatementId = serde_json::from_str("7").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_ordering_follows_raw_key() {
        assert!(AccountId::new(101) < AccountId::new(102));
        assert_eq!(StatementId::new(3).into_inner(), 3);
    }
}
