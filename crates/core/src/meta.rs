//! Object metadata: provenance tags attached to object cores

use serde::{Deserialize, Serialize};

/// Foreign key identifying an object in an external system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// External system, e.g. `github.com`
    pub source: String,
    /// Identifier within that system
    pub id: String,
}

impl ForeignKey {
    /// Create a foreign key
    pub fn new(source: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
        }
    }
}

/// Metadata stored next to object data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Provenance tags; a set, insertion order preserved
    #[serde(default)]
    pub keys: Vec<ForeignKey>,
}

impl ObjectMeta {
    /// True if a key with the same source and id is present
    pub fn contains(&self, key: &ForeignKey) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Insert a key unless already present. Returns true if inserted.
    pub fn insert(&mut self, key: ForeignKey) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.keys.push(key);
        true
    }
}
