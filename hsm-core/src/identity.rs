//! Identity types for the state-machine engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ENTITY ID TYPE SYSTEM
// ============================================================================

/// Trait for type-safe identifiers backed by a UUID.
///
/// Distinct identifier types cannot be accidentally interchanged even though
/// they share the same representation.
pub trait EntityIdType:
    Copy
    + Clone
    + Eq
    + PartialEq
    + Ord
    + Hash
    + fmt::Debug
    + fmt::Display
    + FromStr
    + Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// The name of the entity type (e.g. "machine", "event").
    const ENTITY_NAME: &'static str;

    /// Wrap a raw UUID.
    fn new(uuid: Uuid) -> Self;

    /// Unwrap to the underlying UUID.
    fn as_uuid(&self) -> Uuid;

    /// A nil (all-zero) identifier, used as a sentinel.
    fn nil() -> Self {
        Self::new(Uuid::nil())
    }

    /// A new identifier whose byte order is time-sortable (UUIDv7).
    ///
    /// `EventId` relies on this property: `sequence_number` ordering and
    /// `id` ordering must agree.
    fn now_v7() -> Self {
        Self::new(Uuid::now_v7())
    }

    /// A new random (UUIDv4) identifier, for values with no ordering contract.
    fn new_v4() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Error returned when parsing an identifier from a string fails.
#[derive(Debug, Clone)]
pub struct EntityIdParseError {
    pub entity_name: &'static str,
    pub input: String,
    pub source: uuid::Error,
}

impl fmt::Display for EntityIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to parse {} id from '{}': {}",
            self.entity_name, self.input, self.source
        )
    }
}

impl std::error::Error for EntityIdParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

macro_rules! define_entity_id {
    ($name:ident, $entity:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Uuid);

        impl EntityIdType for $name {
            const ENTITY_NAME: &'static str = $entity;

            fn new(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = EntityIdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::from_str(s)
                    .map(Self::new)
                    .map_err(|e| EntityIdParseError {
                        entity_name: Self::ENTITY_NAME,
                        input: s.to_string(),
                        source: e,
                    })
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                Uuid::deserialize(deserializer).map(Self::new)
            }
        }
    };
}

// ============================================================================
// IDENTIFIER TYPES
// ============================================================================

define_entity_id!(
    MachineId,
    "machine",
    "Identifier of a machine *definition* (not an instance)."
);
define_entity_id!(
    EventId,
    "event",
    "Lexicographically sortable identifier of an `EventRecord`. Backed by UUIDv7, \
     so `id` ordering agrees with `sequence_number` ordering."
);
define_entity_id!(
    LockId,
    "lock",
    "Identifier of a single-writer lock held over a running machine instance."
);

/// Identity of a machine *instance*: the id of its first `EventRecord`.
///
/// A `RootEventId` is sufficient on its own to rehydrate a machine.
pub type RootEventId = EventId;

// ============================================================================
// OTHER IDENTITY TYPES
// ============================================================================

/// UTC timestamp used throughout the engine.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash, used by the archiver to detect corruption.
pub type ContentHash = [u8; 32];

/// Raw, possibly-compressed bytes as stored in an `EventRecord` or archive blob.
pub type RawBytes = Vec<u8>;

/// Compute the SHA-256 hash of a byte slice.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_type_safety() {
        let machine_id = MachineId::now_v7();
        let event_id = EventId::now_v7();
        assert_ne!(machine_id.as_uuid(), event_id.as_uuid());
    }

    #[test]
    fn entity_id_display() {
        let id = MachineId::new(Uuid::nil());
        assert_eq!(
            format!("{:?}", id),
            "MachineId(00000000-0000-0000-0000-000000000000)"
        );
        assert_eq!(format!("{}", id), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn entity_id_from_str() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id: MachineId = uuid_str.parse().expect("valid uuid should parse");
        assert_eq!(id.to_string(), uuid_str);
    }

    #[test]
    fn entity_id_parse_error() {
        let result: Result<MachineId, _> = "not-a-uuid".parse();
        let err = result.unwrap_err();
        assert_eq!(err.entity_name, "machine");
        assert_eq!(err.input, "not-a-uuid");
    }

    #[test]
    fn entity_id_serde_roundtrip() {
        let id = EventId::now_v7();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.starts_with('"'));
        let back: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn event_id_ordering_is_time_sortable() {
        let a = EventId::now_v7();
        let b = EventId::now_v7();
        // UUIDv7's time-ordered prefix guarantees non-decreasing order for
        // identifiers minted in sequence on the same clock.
        assert!(a <= b);
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = compute_content_hash(b"hello");
        let b = compute_content_hash(b"hello");
        assert_eq!(a, b);
        let c = compute_content_hash(b"world");
        assert_ne!(a, c);
    }
}
