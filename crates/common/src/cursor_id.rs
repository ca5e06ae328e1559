//! Cursor identifier using UUIDv7
//!
//! UUIDv7 provides time-ordered uniqueness without any coordination between
//! the tasks that create cursors, and a standard string form that clients
//! can hand back verbatim on follow-up requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Cursor identifier using UUIDv7 for time-ordered uniqueness
///
/// The string form is the wire form: clients receive it with the first
/// batch and present it on every fetch/dispose call afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorId(Uuid);

impl CursorId {
    /// Generate a new cursor ID using UUIDv7
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create from existing UUID (for testing/deserialization)
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse from string representation
    pub fn parse(s: &str) -> Result<Self, String> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid cursor ID: {}", e))
    }
}

impl Default for CursorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CursorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let id = CursorId::new();
        let s = id.to_string();
        let parsed = CursorId::parse(&s).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CursorId::parse("not-a-cursor-id").is_err());
        assert!(CursorId::parse("").is_err());
    }

    #[test]
    fn test_unique() {
        let a = CursorId::new();
        let b = CursorId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_eq_consistency() {
        use std::collections::HashMap;

        let id1 = CursorId::new();
        let id2 = id1; // Copy

        let mut map = HashMap::new();
        map.insert(id1, "value");

        // Should be able to retrieve with copy
        assert_eq!(map.get(&id2), Some(&"value"));
    }

    #[test]
    fn test_from_uuid() {
        let uuid = Uuid::now_v7();
        let id = CursorId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
    }
}
