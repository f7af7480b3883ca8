//! Database engine for Tidepool
//!
//! This crate ties the lower layers together:
//! - Database: session owning an object store and its schema registry
//! - DatabaseConfig: settings loaded from `tidepool.toml`
//! - MigrationSpec: declarative type-to-type migrations run by the database
//!
//! The engine is the only component that knows about:
//! - Which registry belongs to which store
//! - Migration ordering and flushing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;
pub mod migration;

pub use database::{
    Database, DatabaseBuilder, DatabaseConfig, MigrationConfig, SchemaConfig, CONFIG_FILE_NAME,
};
pub use migration::{MigrationContext, MigrationEvent, MigrationHook, MigrationSpec, TransformFn};
