//! Object store layer for Tidepool
//!
//! This crate provides:
//! - ObjectCore: mutable, identity-addressed record with change notification
//! - ObjectSnapshot / ObjectDraft: immutable copies and construction input
//! - ObjectStore: the trait the query, schema and migration layers consume
//! - MemoryObjectStore: in-memory implementation with lazy-load tier

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod object;
pub mod store;

pub use memory::MemoryObjectStore;
pub use object::{ObjectCore, ObjectDraft, ObjectSnapshot};
pub use store::{ObjectStore, StoreChange};
