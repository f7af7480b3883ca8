//! MemoryObjectStore: in-memory object store
//!
//! Objects live in two tiers:
//! - loaded: visible to synchronous reads (`get_by_id`, `loaded_objects`)
//! - unloaded: known to the store but only reachable through the async
//!   loaders, which promote them into the loaded tier
//!
//! The unloaded tier models a replica that has not finished loading, so
//! callers can exercise the difference between `run_sync` and `run`.
//!
//! # Design Notes
//!
//! - **Insertion order**: kept in a separate id list so iteration is stable
//! - **Pending writes**: counted per mutation and cleared by `flush`
//! - **Events after unlock**: change events are emitted once the write lock
//!   has been released

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tidepool_core::json::value_type_name;
use tidepool_core::{Dxn, Error, Event, ObjectId, Result, SpaceId};
use tracing::{debug, trace};

use crate::object::{ObjectCore, ObjectDraft};
use crate::store::{ObjectStore, StoreChange};

#[derive(Debug, Default)]
struct Tiers {
    order: Vec<ObjectId>,
    loaded: HashMap<ObjectId, Arc<ObjectCore>>,
    unloaded: HashMap<ObjectId, Arc<ObjectCore>>,
}

impl Tiers {
    fn contains(&self, id: &ObjectId) -> bool {
        self.loaded.contains_key(id) || self.unloaded.contains_key(id)
    }

    fn any(&self, id: &ObjectId) -> Option<Arc<ObjectCore>> {
        self.loaded
            .get(id)
            .or_else(|| self.unloaded.get(id))
            .cloned()
    }
}

/// In-memory [`ObjectStore`]
#[derive(Debug)]
pub struct MemoryObjectStore {
    namespace: SpaceId,
    tiers: RwLock<Tiers>,
    pending_writes: AtomicU64,
    flushes: AtomicU64,
    changes: Event<StoreChange>,
}

impl MemoryObjectStore {
    /// Create an empty store for `namespace`
    pub fn new(namespace: SpaceId) -> Self {
        Self {
            namespace,
            tiers: RwLock::new(Tiers::default()),
            pending_writes: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            changes: Event::new(),
        }
    }

    /// Create an empty store with a random namespace
    pub fn with_random_namespace() -> Self {
        Self::new(SpaceId::random())
    }

    /// Insert an object into the unloaded tier
    ///
    /// The object is invisible to synchronous reads until an async load
    /// promotes it. No change event is emitted.
    pub fn stage_unloaded(&self, draft: ObjectDraft) -> Result<ObjectId> {
        let core = Arc::new(draft.into_core()?);
        let id = core.id().clone();
        let mut tiers = self.tiers.write();
        if tiers.contains(&id) {
            return Err(Error::usage(format!("object {} already exists", id)));
        }
        tiers.order.push(id.clone());
        tiers.unloaded.insert(id.clone(), core);
        trace!(target: "tidepool::store", id = %id, "staged unloaded object");
        Ok(id)
    }

    /// Number of objects, both tiers, tombstones included
    pub fn len(&self) -> usize {
        self.tiers.read().order.len()
    }

    /// True if the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of objects still in the unloaded tier
    pub fn unloaded_count(&self) -> usize {
        self.tiers.read().unloaded.len()
    }

    /// Mutations since the last flush
    pub fn pending_writes(&self) -> u64 {
        self.pending_writes.load(Ordering::Acquire)
    }

    /// Number of completed flushes
    pub fn flush_count(&self) -> u64 {
        self.flushes.load(Ordering::Acquire)
    }

    fn promote(&self, ids: &[ObjectId]) -> Vec<ObjectId> {
        let mut promoted = Vec::new();
        {
            let mut tiers = self.tiers.write();
            for id in ids {
                if let Some(core) = tiers.unloaded.remove(id) {
                    tiers.loaded.insert(id.clone(), core);
                    promoted.push(id.clone());
                }
            }
        }
        for id in &promoted {
            self.changes.emit(&StoreChange::Loaded(id.clone()));
        }
        promoted
    }

    fn record_write(&self) {
        self.pending_writes.fetch_add(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn namespace(&self) -> &SpaceId {
        &self.namespace
    }

    fn get_by_id(&self, id: &ObjectId) -> Option<Arc<ObjectCore>> {
        self.tiers.read().loaded.get(id).cloned()
    }

    async fn load_by_id(&self, id: &ObjectId) -> Result<Option<Arc<ObjectCore>>> {
        if let Some(core) = self.get_by_id(id) {
            return Ok(Some(core));
        }
        self.promote(std::slice::from_ref(id));
        Ok(self.get_by_id(id))
    }

    fn loaded_objects(&self) -> Vec<Arc<ObjectCore>> {
        let tiers = self.tiers.read();
        tiers
            .order
            .iter()
            .filter_map(|id| tiers.loaded.get(id).cloned())
            .collect()
    }

    async fn load_all(&self) -> Result<Vec<Arc<ObjectCore>>> {
        let staged: Vec<ObjectId> = self.tiers.read().unloaded.keys().cloned().collect();
        if !staged.is_empty() {
            let promoted = self.promote(&staged);
            debug!(target: "tidepool::store", count = promoted.len(), "loaded staged objects");
        }
        Ok(self.loaded_objects())
    }

    fn add(&self, draft: ObjectDraft) -> Result<Arc<ObjectCore>> {
        let core = Arc::new(draft.into_core()?);
        let id = core.id().clone();
        {
            let mut tiers = self.tiers.write();
            if tiers.contains(&id) {
                return Err(Error::usage(format!("object {} already exists", id)));
            }
            tiers.order.push(id.clone());
            tiers.loaded.insert(id.clone(), Arc::clone(&core));
        }
        self.record_write();
        debug!(target: "tidepool::store", id = %id, "added object");
        self.changes.emit(&StoreChange::Added(id));
        Ok(core)
    }

    fn remove(&self, id: &ObjectId) -> Result<()> {
        let core = self
            .tiers
            .read()
            .any(id)
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))?;
        if core.set_deleted(true) {
            self.record_write();
            debug!(target: "tidepool::store", id = %id, "removed object");
            self.changes.emit(&StoreChange::Removed(id.clone()));
        }
        Ok(())
    }

    fn replace_data(&self, id: &ObjectId, data: Value, type_ref: Option<Dxn>) -> Result<()> {
        let data: Map<String, Value> = match data {
            Value::Object(map) => map,
            other => {
                return Err(Error::usage(format!(
                    "object data must be an object, got {}",
                    value_type_name(&other)
                )))
            }
        };
        let core = self
            .tiers
            .read()
            .any(id)
            .ok_or_else(|| Error::ObjectNotFound(id.clone()))?;
        core.replace_atomically(data, type_ref);
        self.record_write();
        debug!(target: "tidepool::store", id = %id, "replaced object data");
        self.changes.emit(&StoreChange::Replaced(id.clone()));
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let written = self.pending_writes.swap(0, Ordering::AcqRel);
        self.flushes.fetch_add(1, Ordering::AcqRel);
        trace!(target: "tidepool::store", written, "flushed");
        Ok(())
    }

    fn changes(&self) -> &Event<StoreChange> {
        &self.changes
    }
}
