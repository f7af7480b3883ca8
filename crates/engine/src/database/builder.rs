//! Database builder for fluent configuration

use std::path::Path;
use std::sync::Arc;
use tidepool_core::{Result, SpaceId};
use tidepool_schema::RuntimeSchemaRegistry;
use tidepool_storage::{MemoryObjectStore, ObjectStore};

use super::config::DatabaseConfig;
use super::Database;

// ============================================================================
// Database Builder Pattern
// ============================================================================

/// Builder for [`Database`]
///
/// ```ignore
/// use tidepool_engine::Database;
///
/// // In-memory store, default settings
/// let db = Database::builder().open().await?;
///
/// // Settings from tidepool.toml, shared static schemas
/// let db = Database::builder()
///     .config_file("tidepool.toml")?
///     .runtime(runtime)
///     .open()
///     .await?;
/// ```
///
/// Without an explicit store the builder creates a [`MemoryObjectStore`] in
/// the configured namespace.
#[derive(Default)]
pub struct DatabaseBuilder {
    config: DatabaseConfig,
    store: Option<Arc<dyn ObjectStore>>,
    runtime: Option<Arc<RuntimeSchemaRegistry>>,
}

impl DatabaseBuilder {
    /// Create new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given configuration
    pub fn config(mut self, config: DatabaseConfig) -> Self {
        self.config = config;
        self
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        self.config = DatabaseConfig::from_file(path.as_ref())?;
        Ok(self)
    }

    /// Set the namespace of the default in-memory store
    pub fn namespace(mut self, namespace: SpaceId) -> Self {
        self.config.namespace = Some(namespace.as_str().to_string());
        self
    }

    /// Use an existing object store
    pub fn store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share a registry of static definitions
    pub fn runtime(mut self, runtime: Arc<RuntimeSchemaRegistry>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Assemble the database without opening it
    pub fn build(self) -> Database {
        let store = self.store.unwrap_or_else(|| {
            Arc::new(MemoryObjectStore::new(self.config.namespace_or_random())) as Arc<dyn ObjectStore>
        });
        let runtime = self
            .runtime
            .unwrap_or_else(|| Arc::new(RuntimeSchemaRegistry::new()));
        Database::assemble(store, runtime, self.config)
    }

    /// Assemble and open the database
    pub async fn open(self) -> Result<Database> {
        let db = self.build();
        db.open().await?;
        Ok(db)
    }
}

impl std::fmt::Debug for DatabaseBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseBuilder")
            .field("config", &self.config)
            .field("custom_store", &self.store.is_some())
            .field("shared_runtime", &self.runtime.is_some())
            .finish()
    }
}
