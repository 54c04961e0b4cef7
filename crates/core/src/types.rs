//! Identifier types
//!
//! - `SystemId`: name of a networked node hosting a container and an assembler
//! - `SessionId`: one negotiation/assembly session (the "reference id")
//! - `ElementId`: one factory, allocator, instance or resource inside a container

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name of a system (node) taking part in assembly
///
/// Systems are addressed by a stable, human-chosen name such as a host name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SystemId(String);

impl SystemId {
    /// Create a system id from its name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The system name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SystemId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Unique identifier for a negotiation/assembly session
///
/// A wrapper around a UUID v4. The same session id is used on every system
/// taking part in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a SessionId from its string form
    ///
    /// Returns None if the string is not a valid UUID.
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a container element
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(Uuid);

impl ElementId {
    /// Create a new random ElementId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The nil id, used for failures of elements that were never registered
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the nil id
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_session_id_string_roundtrip() {
        let id = SessionId::new();
        let parsed = SessionId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(SessionId::from_string("not-a-uuid").is_none());
    }

    #[test]
    fn test_element_nil() {
        assert!(ElementId::nil().is_nil());
        assert!(!ElementId::new().is_nil());
    }

    #[test]
    fn test_system_id_display() {
        let id = SystemId::new("kitchen-pc");
        assert_eq!(id.to_string(), "kitchen-pc");
        assert_eq!(SystemId::from("kitchen-pc"), id);
    }
}
