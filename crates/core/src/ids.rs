//! Identity types
//!
//! - ObjectId: identity of one object core, unique within a namespace
//! - SpaceId: identity of a namespace (the unit a registry is scoped to)

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use uuid::Uuid;

/// Tag used in place of a space id for references local to the current space.
pub const LOCAL_SPACE_TAG: &str = "@";

/// Unique identifier of an object within a namespace
///
/// Opaque string. Freshly generated ids are 32 uppercase hex characters
/// (UUID v4 without hyphens), which sort and compare as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Generate a new random id
    pub fn random() -> Self {
        Self(Uuid::new_v4().simple().to_string().to_uppercase())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for ObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of a namespace ("space")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpaceId(String);

impl SpaceId {
    /// Generate a new random space id
    pub fn random() -> Self {
        Self(format!("S{}", Uuid::new_v4().simple()).to_uppercase())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SpaceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SpaceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_ids_are_unique() {
        let a = ObjectId::random();
        let b = ObjectId::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_object_id_serializes_as_plain_string() {
        let id = ObjectId::from("ABC");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ABC\"");
    }

    #[test]
    fn test_space_id_display() {
        let space = SpaceId::from("S1");
        assert_eq!(space.to_string(), "S1");
        assert_ne!(SpaceId::random(), SpaceId::random());
    }
}
