//! Object store abstraction
//!
//! The replicated storage layer is consumed through [`ObjectStore`]. Reads
//! come in two flavours: a synchronous view over what is already loaded
//! (possibly incomplete) and an asynchronous fetch that loads whatever is
//! missing. Membership changes are published on [`ObjectStore::changes`];
//! per-object changes are on each core's `updates` event.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tidepool_core::{Dxn, Event, ObjectId, Result, SpaceId};

use crate::object::{ObjectCore, ObjectDraft};

/// Membership change published by a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// A new object was added
    Added(ObjectId),
    /// An existing object became visible to synchronous reads
    Loaded(ObjectId),
    /// An object was tombstoned
    Removed(ObjectId),
    /// Data and type of an object were replaced
    Replaced(ObjectId),
}

impl StoreChange {
    /// Object the change concerns
    pub fn object_id(&self) -> &ObjectId {
        match self {
            StoreChange::Added(id)
            | StoreChange::Loaded(id)
            | StoreChange::Removed(id)
            | StoreChange::Replaced(id) => id,
        }
    }
}

/// Identity-addressed store of object cores
///
/// Implementations must be safe to call from multiple threads and must emit
/// change events outside of their internal locks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Namespace the store belongs to
    fn namespace(&self) -> &SpaceId;

    /// Loaded object by id
    ///
    /// Returns `None` if the object is unknown or not loaded yet.
    fn get_by_id(&self, id: &ObjectId) -> Option<Arc<ObjectCore>>;

    /// Object by id, loading it if necessary
    async fn load_by_id(&self, id: &ObjectId) -> Result<Option<Arc<ObjectCore>>>;

    /// All loaded objects, tombstoned ones included, in insertion order
    fn loaded_objects(&self) -> Vec<Arc<ObjectCore>>;

    /// All objects, loading any that are missing
    async fn load_all(&self) -> Result<Vec<Arc<ObjectCore>>>;

    /// Create an object
    ///
    /// # Errors
    ///
    /// `Error::Usage` if the draft's data is not an object or its id is taken.
    fn add(&self, draft: ObjectDraft) -> Result<Arc<ObjectCore>>;

    /// Tombstone an object
    ///
    /// # Errors
    ///
    /// `Error::ObjectNotFound` if the store does not hold `id`.
    fn remove(&self, id: &ObjectId) -> Result<()>;

    /// Replace data and type of an object as one indivisible update
    ///
    /// # Errors
    ///
    /// `Error::ObjectNotFound` if the store does not hold `id`;
    /// `Error::Usage` if `data` is not an object.
    fn replace_data(&self, id: &ObjectId, data: Value, type_ref: Option<Dxn>) -> Result<()>;

    /// Persist pending writes
    async fn flush(&self) -> Result<()>;

    /// Membership change notifications
    fn changes(&self) -> &Event<StoreChange>;
}
