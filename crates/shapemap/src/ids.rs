//! Identifier newtypes for persisted fingerprints.
//!
//! Fingerprints are plain `i64` values derived from structural
//! hashes; the wrappers keep type IDs and field IDs from being mixed
//! up in repository signatures.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_hash_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

define_hash_id!(EntityTypeId);
define_hash_id!(EntityFieldId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_and_display() {
        let id = EntityTypeId::new(-42);
        assert_eq!(id.get(), -42);
        assert_eq!(id.to_string(), "-42");
        assert_eq!(EntityTypeId::from(-42), id);
    }

    #[test]
    fn test_serde_transparent() {
        let id = EntityFieldId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        let back: EntityFieldId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
