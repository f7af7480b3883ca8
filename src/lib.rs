//! Tidepool - local-first reactive object database core
//!
//! Tidepool keeps typed JSON objects in a namespace-scoped store and layers
//! three subsystems over it: a schema registry, a filter/query engine with
//! reactive prepared queries, and a migration pipeline that moves objects
//! between schema versions.
//!
//! # Quick Start
//!
//! ```ignore
//! use tidepool::{Database, Filter, MigrationSpec, ObjectDraft, TypeDefinition};
//! use serde_json::json;
//!
//! let db = Database::builder().open().await?;
//! let v1 = TypeDefinition::new("example.com/type/Contact", "0.1.0");
//! let v2 = TypeDefinition::new("example.com/type/Contact", "0.2.0");
//!
//! db.add(ObjectDraft::typed(v1.static_type_ref(), json!({"firstName": "John", "lastName": "Doe"})))?;
//!
//! let spec = MigrationSpec::define(&v1, &v2, |from, _| async move {
//!     let first = from.get_str("firstName").unwrap_or_default().to_string();
//!     let last = from.get_str("lastName").unwrap_or_default().to_string();
//!     Ok(json!({ "name": format!("{first} {last}") }))
//! })?;
//! db.run_migrations(&[spec]).await?;
//!
//! let contacts = db.query(Filter::type_ref(v2.static_type_ref())).run().await?;
//! ```
//!
//! # Architecture
//!
//! - `tidepool-core`: ids, references, errors, events, dependency tracking
//! - `tidepool-storage`: object cores and the object store seam
//! - `tidepool-query`: filters, matching, prepared queries
//! - `tidepool-schema`: type records and the schema registry
//! - `tidepool-engine`: database session, configuration, migrations

pub use tidepool_core::{
    decode_reference, encode_reference, ensure_exact_version, is_exact_version, Dxn, Error,
    Event, ForeignKey, JsonPath, ObjectId, ObjectMeta, Result, SpaceId, Subscription,
};
pub use tidepool_engine::{
    Database, DatabaseBuilder, DatabaseConfig, MigrationContext, MigrationEvent, MigrationSpec,
};
pub use tidepool_query::{
    matches, DeletedPolicy, Filter, MatchContext, PreparedQuery, QueryOptions, QuerySubscription,
    Resolver, SubscribeOptions,
};
pub use tidepool_schema::{
    JsonSchema, RecordState, RegisterSchemaInput, RuntimeSchemaRegistry, SchemaDeclaration,
    SchemaLocation, SchemaQuery, SchemaRegistry, SchemaRegistryOptions, TypeDefinition,
    TypeRecord,
};
pub use tidepool_storage::{MemoryObjectStore, ObjectCore, ObjectDraft, ObjectSnapshot, ObjectStore};
