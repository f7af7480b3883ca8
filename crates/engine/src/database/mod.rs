//! Database session
//!
//! A [`Database`] owns one object store together with the schema registry
//! indexing it and the static definitions that registry shares. It is the
//! handle migrations and application code work through:
//!
//! - object access: `add`, `remove`, `get_object_by_id`, `query`
//! - schema access: `schema_registry`
//! - lifecycle: `open`, `close`, `flush`
//! - migrations: `run_migrations`
//!
//! The registry is owned by the session rather than looked up globally, so
//! two databases never share registry state unless they share a runtime
//! registry explicitly.

pub mod builder;
pub mod config;

pub use builder::DatabaseBuilder;
pub use config::{DatabaseConfig, MigrationConfig, SchemaConfig, CONFIG_FILE_NAME};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tidepool_core::{ObjectId, Result, SpaceId};
use tidepool_query::{query_objects, Filter, PreparedQuery};
use tidepool_schema::{RuntimeSchemaRegistry, SchemaRegistry};
use tidepool_storage::{ObjectCore, ObjectDraft, ObjectStore};
use tracing::{debug, info};

struct DatabaseInner {
    store: Arc<dyn ObjectStore>,
    runtime: Arc<RuntimeSchemaRegistry>,
    schemas: SchemaRegistry,
    config: DatabaseConfig,
    open: AtomicBool,
}

/// Database session handle
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Builder with default settings
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    pub(crate) fn assemble(
        store: Arc<dyn ObjectStore>,
        runtime: Arc<RuntimeSchemaRegistry>,
        config: DatabaseConfig,
    ) -> Self {
        let schemas = SchemaRegistry::new(
            Arc::clone(&store),
            Arc::clone(&runtime),
            config.schema.registry_options(),
        );
        Self {
            inner: Arc::new(DatabaseInner {
                store,
                runtime,
                schemas,
                config,
                open: AtomicBool::new(false),
            }),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the schema registry
    pub async fn open(&self) -> Result<()> {
        if self.inner.open.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.schemas.open().await?;
        info!(
            target: "tidepool::db",
            namespace = %self.namespace(),
            schemas = self.inner.schemas.records().len(),
            "database opened"
        );
        Ok(())
    }

    /// Close the schema registry and flush pending writes
    pub async fn close(&self) -> Result<()> {
        if !self.inner.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.schemas.close().await?;
        self.flush().await?;
        info!(target: "tidepool::db", namespace = %self.namespace(), "database closed");
        Ok(())
    }

    /// True between `open` and `close`
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Persist pending writes
    pub async fn flush(&self) -> Result<()> {
        self.inner.store.flush().await?;
        debug!(target: "tidepool::db", "flushed");
        Ok(())
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Add an object
    pub fn add(&self, draft: ObjectDraft) -> Result<Arc<ObjectCore>> {
        self.inner.store.add(draft)
    }

    /// Tombstone an object
    pub fn remove(&self, id: &ObjectId) -> Result<()> {
        self.inner.store.remove(id)
    }

    /// Loaded object by id
    pub fn get_object_by_id(&self, id: &ObjectId) -> Option<Arc<ObjectCore>> {
        self.inner.store.get_by_id(id)
    }

    /// Object by id, loading it if needed
    pub async fn load_object_by_id(&self, id: &ObjectId) -> Result<Option<Arc<ObjectCore>>> {
        self.inner.store.load_by_id(id).await
    }

    /// Prepared query over objects matching `filter`
    pub fn query(&self, filter: Filter) -> PreparedQuery<Arc<ObjectCore>> {
        query_objects(Arc::clone(&self.inner.store), filter)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Schema registry of this database
    pub fn schema_registry(&self) -> &SchemaRegistry {
        &self.inner.schemas
    }

    /// Shared static definitions
    pub fn runtime(&self) -> &Arc<RuntimeSchemaRegistry> {
        &self.inner.runtime
    }

    /// Underlying object store
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.inner.store
    }

    /// Namespace of the store
    pub fn namespace(&self) -> &SpaceId {
        self.inner.store.namespace()
    }

    /// Settings in effect
    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("namespace", self.namespace())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tidepool_core::Dxn;
    use tidepool_schema::{RegisterSchemaInput, TypeDefinition};
    use tidepool_storage::MemoryObjectStore;

    #[tokio::test]
    async fn open_close_is_idempotent() {
        let db = Database::builder().open().await.unwrap();
        assert!(db.is_open());
        db.open().await.unwrap();
        db.close().await.unwrap();
        db.close().await.unwrap();
        assert!(!db.is_open());
    }

    #[tokio::test]
    async fn namespace_comes_from_config() {
        let db = Database::builder()
            .namespace(SpaceId::from("SPACE"))
            .build();
        assert_eq!(db.namespace().as_str(), "SPACE");
    }

    #[tokio::test]
    async fn objects_round_trip_through_store() {
        let store = Arc::new(MemoryObjectStore::with_random_namespace());
        let db = Database::builder()
            .store(Arc::clone(&store) as Arc<dyn ObjectStore>)
            .open()
            .await
            .unwrap();

        let core = db
            .add(ObjectDraft::typed(Dxn::typed("a/Task", "1.0.0"), json!({"title": "x"})))
            .unwrap();
        assert!(db.get_object_by_id(core.id()).is_some());
        assert_eq!(
            db.query(Filter::typename("a/Task").unwrap()).run().await.unwrap().len(),
            1
        );

        db.remove(core.id()).unwrap();
        assert!(db.query(Filter::all()).run().await.unwrap().is_empty());

        db.close().await.unwrap();
        assert_eq!(store.pending_writes(), 0);
    }

    #[tokio::test]
    async fn registry_sees_schemas_added_while_open() {
        let db = Database::builder().open().await.unwrap();
        db.schema_registry()
            .register([RegisterSchemaInput::Definition(TypeDefinition::new(
                "a/Task", "1.0.0",
            ))])
            .unwrap();
        assert!(db.schema_registry().get_schema_by_typename("a/Task").is_some());
        db.close().await.unwrap();
    }
}
