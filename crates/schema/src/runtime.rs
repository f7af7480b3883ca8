//! Registry of static type definitions
//!
//! Static definitions live in memory and are shared between schema
//! registries by handing the same [`RuntimeSchemaRegistry`] to each of them.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tidepool_core::{ensure_exact_version, Error, Result};
use tracing::debug;

use crate::definition::TypeDefinition;
use crate::record::TypeRecord;
use crate::stored::schema_type_definition;

#[derive(Default)]
struct Entries {
    order: Vec<Arc<TypeRecord>>,
    by_key: HashMap<(String, String), Arc<TypeRecord>>,
}

/// Static type definitions, one record per (typename, version)
pub struct RuntimeSchemaRegistry {
    entries: RwLock<Entries>,
}

impl RuntimeSchemaRegistry {
    /// Registry holding the stored-schema system type
    pub fn new() -> Self {
        let registry = Self {
            entries: RwLock::new(Entries::default()),
        };
        registry.insert(schema_type_definition());
        registry
    }

    /// Register a static definition, returning the existing record if the
    /// same typename and version is already present
    ///
    /// # Errors
    ///
    /// `Error::Usage` for an empty typename; `Error::Unsupported` when the
    /// version is a range.
    pub fn register(&self, definition: TypeDefinition) -> Result<Arc<TypeRecord>> {
        if definition.typename().is_empty() {
            return Err(Error::usage("Static schema must have a typename"));
        }
        ensure_exact_version(definition.version())?;
        Ok(self.insert(definition))
    }

    /// Register several definitions
    pub fn register_all<I>(&self, definitions: I) -> Result<Vec<Arc<TypeRecord>>>
    where
        I: IntoIterator<Item = TypeDefinition>,
    {
        definitions.into_iter().map(|d| self.register(d)).collect()
    }

    fn insert(&self, definition: TypeDefinition) -> Arc<TypeRecord> {
        let key = (
            definition.typename().to_string(),
            definition.version().to_string(),
        );
        let mut entries = self.entries.write();
        if let Some(existing) = entries.by_key.get(&key) {
            return Arc::clone(existing);
        }
        debug!(target: "tidepool::schema", typename = %key.0, version = %key.1, "registered static schema");
        let record = TypeRecord::from_definition(definition);
        entries.by_key.insert(key, Arc::clone(&record));
        entries.order.push(Arc::clone(&record));
        record
    }

    /// All records in registration order
    pub fn records(&self) -> Vec<Arc<TypeRecord>> {
        self.entries.read().order.clone()
    }

    /// Record for `typename`; with no version, the most recently registered one
    pub fn get(&self, typename: &str, version: Option<&str>) -> Option<Arc<TypeRecord>> {
        let entries = self.entries.read();
        match version {
            Some(version) => entries
                .by_key
                .get(&(typename.to_string(), version.to_string()))
                .cloned(),
            None => entries
                .order
                .iter()
                .rev()
                .find(|record| record.typename() == typename)
                .cloned(),
        }
    }

    /// True if any version of `typename` is registered
    pub fn contains(&self, typename: &str) -> bool {
        self.get(typename, None).is_some()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.entries.read().order.len()
    }

    /// True if no records are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RuntimeSchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuntimeSchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeSchemaRegistry")
            .field("records", &self.len())
            .finish()
    }
}
