//! # Core Type Definitions
//!
//! Identifier types shared by every layer of the hierarchy registry.
//!
//! ## Key Types
//!
//! - [`DoId`] - Identifier of a distributed object; parents are plain `DoId`s
//! - [`ZoneId`] - Interest zone partition key within a parent
//! - [`Location`] - A `(parent, zone)` cell
//!
//! Identifiers are handed out by an external allocator. The registry only
//! compares and hashes them, so the wrappers exist purely to keep parents,
//! zones and objects from being confused at call sites.

use serde::{Deserialize, Serialize};

/// Identifier of a distributed object.
///
/// Parent identifiers are ordinary object ids: a parent is any object that
/// appears as the container of at least one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DoId(pub u64);

impl DoId {
    /// The null object id. Never stored as a parent by the dispatcher adapter.
    pub const NULL: DoId = DoId(0);

    /// Returns true for the null id.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for DoId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for DoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an interest zone within a parent.
///
/// The registry stores reserved zone values like any other; zone semantics
/// live in [`crate::dispatcher::ZonePolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub u32);

impl ZoneId {
    /// The null zone.
    pub const NULL: ZoneId = ZoneId(0);
}

impl From<u32> for ZoneId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A `(parent, zone)` cell: the primary bucket of the location table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub parent: DoId,
    pub zone: ZoneId,
}

impl Location {
    pub fn new(parent: impl Into<DoId>, zone: impl Into<ZoneId>) -> Self {
        Self {
            parent: parent.into(),
            zone: zone.into(),
        }
    }

    /// The location an object has before it is placed anywhere.
    pub const fn null() -> Self {
        Self {
            parent: DoId::NULL,
            zone: ZoneId::NULL,
        }
    }

    /// A location with both parent and zone zero is never stored.
    pub fn is_null(&self) -> bool {
        self.parent.is_null() && self.zone == ZoneId::NULL
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.parent, self.zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_location() {
        assert!(Location::null().is_null());
        assert!(!Location::new(0u64, 2u32).is_null());
        assert!(!Location::new(100u64, 0u32).is_null());
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&Location::new(100u64, 2u32)).unwrap();
        assert_eq!(json, r#"{"parent":100,"zone":2}"#);
    }
}
