//! Schema registry for Tidepool
//!
//! This crate provides:
//! - JsonSchema / TypeDefinition: structural and static type definitions
//! - TypeRecord: registry-held definitions, static or backed by a stored object
//! - RuntimeSchemaRegistry: shared static definitions
//! - SchemaRegistry: per-store index with reactive schema queries
//! - SchemaDeclaration: anything that resolves to a type reference

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod declaration;
pub mod definition;
pub mod json_schema;
pub mod record;
pub mod registry;
pub mod runtime;
pub mod stored;

pub use declaration::{schema_filter, SchemaDeclaration};
pub use definition::TypeDefinition;
pub use json_schema::{IntegrityIssue, JsonSchema};
pub use record::{RecordState, SchemaSnapshot, TypeRecord, TypeSource};
pub use registry::{
    RegisterSchemaInput, SchemaLocation, SchemaQuery, SchemaRegistry, SchemaRegistryOptions,
};
pub use runtime::RuntimeSchemaRegistry;
pub use stored::{
    is_stored_schema, schema_type_ref, stored_schema_filter, StoredSchemaData, SCHEMA_TYPENAME,
    SCHEMA_VERSION,
};
