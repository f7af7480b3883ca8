//! Shared test utilities for all integration test suites.
//!
//! Import via `mod common;` from any test's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

pub use serde_json::{json, Value};
pub use tidepool::{
    Database, DatabaseConfig, Dxn, Error, Filter, MemoryObjectStore, MigrationSpec, ObjectCore,
    ObjectDraft, ObjectId, ObjectStore, PreparedQuery, RegisterSchemaInput, SchemaQuery,
    SubscribeOptions, TypeDefinition, TypeRecord,
};

pub const CONTACT: &str = "example.com/type/Contact";

static INIT_TRACING: Once = Once::new();

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// TestDb - database over an inspectable in-memory store
// ============================================================================

/// Open database plus direct access to its in-memory store.
pub struct TestDb {
    pub db: Database,
    pub store: Arc<MemoryObjectStore>,
}

impl TestDb {
    /// Open with default config.
    pub async fn open() -> Self {
        Self::open_with(DatabaseConfig::default()).await
    }

    /// Open with the given config.
    pub async fn open_with(config: DatabaseConfig) -> Self {
        init_tracing();
        let store = Arc::new(MemoryObjectStore::with_random_namespace());
        let db = Database::builder()
            .config(config)
            .store(Arc::clone(&store) as Arc<dyn ObjectStore>)
            .open()
            .await
            .expect("open database");
        Self { db, store }
    }

    /// Add a typed object.
    pub fn add_typed(&self, definition: &TypeDefinition, data: Value) -> Arc<ObjectCore> {
        self.db
            .add(ObjectDraft::typed(definition.static_type_ref(), data))
            .expect("add object")
    }

    /// All visible objects of `definition`'s exact type.
    pub async fn objects_of(&self, definition: &TypeDefinition) -> Vec<Arc<ObjectCore>> {
        self.db
            .query(Filter::type_ref(definition.static_type_ref()))
            .run()
            .await
            .expect("query objects")
    }
}

/// Contact type at `version`.
pub fn contact(version: &str) -> TypeDefinition {
    TypeDefinition::new(CONTACT, version)
}

/// Callback that counts invocations.
pub fn counter<T: Send + Sync + 'static>(
) -> (Arc<AtomicUsize>, impl Fn(&PreparedQuery<T>) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    (count, move |_: &PreparedQuery<T>| {
        c.fetch_add(1, Ordering::SeqCst);
    })
}

/// Current value of a counter.
pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
