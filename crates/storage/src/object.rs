//! Object cores: the canonical mutable record for one identity
//!
//! An [`ObjectCore`] owns the type reference, data, metadata and tombstone
//! flag of one stored object, plus an `updates` event fired after every
//! change. Reads through the accessors are recorded with
//! [`tidepool_core::tracking`] so reactive queries learn their dependencies.
//!
//! The id never changes. The type reference has no ordinary setter: it only
//! changes together with the data through [`ObjectCore::replace_atomically`],
//! which the store exposes as `replace_data`.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tidepool_core::json::{delete_at_path, get_at_path, set_at_path, value_type_name};
use tidepool_core::tracking::record_read;
use tidepool_core::{Dxn, Error, Event, ForeignKey, JsonPath, ObjectId, ObjectMeta, Result};

#[derive(Debug, Clone)]
struct CoreState {
    type_ref: Option<Dxn>,
    data: Value,
    meta: ObjectMeta,
    deleted: bool,
}

/// One stored object
pub struct ObjectCore {
    id: ObjectId,
    state: RwLock<CoreState>,
    updates: Event<()>,
}

impl ObjectCore {
    pub(crate) fn new(
        id: ObjectId,
        type_ref: Option<Dxn>,
        data: Map<String, Value>,
        meta: ObjectMeta,
    ) -> Self {
        Self {
            id,
            state: RwLock::new(CoreState {
                type_ref,
                data: Value::Object(data),
                meta,
                deleted: false,
            }),
            updates: Event::new(),
        }
    }

    /// Object identity
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Declared type, `None` for untyped objects
    pub fn type_ref(&self) -> Option<Dxn> {
        record_read(&self.id);
        self.state.read().type_ref.clone()
    }

    /// Copy of the whole data object
    pub fn data(&self) -> Value {
        record_read(&self.id);
        self.state.read().data.clone()
    }

    /// Value at `path` inside the data
    pub fn get(&self, path: &JsonPath) -> Option<Value> {
        record_read(&self.id);
        get_at_path(&self.state.read().data, path).cloned()
    }

    /// Metadata (foreign keys)
    pub fn meta(&self) -> ObjectMeta {
        record_read(&self.id);
        self.state.read().meta.clone()
    }

    /// Tombstone flag
    pub fn is_deleted(&self) -> bool {
        record_read(&self.id);
        self.state.read().deleted
    }

    /// Consistent copy of the object's current state
    pub fn snapshot(&self) -> ObjectSnapshot {
        record_read(&self.id);
        let state = self.state.read();
        ObjectSnapshot {
            id: self.id.clone(),
            type_ref: state.type_ref.clone(),
            data: state.data.clone(),
            meta: state.meta.clone(),
            deleted: state.deleted,
        }
    }

    /// Change notifications, one per mutation
    pub fn updates(&self) -> &Event<()> {
        &self.updates
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Set the value at `path`
    ///
    /// # Errors
    ///
    /// `Error::Usage` when `path` is the root and `value` is not an object;
    /// `Error::InvalidPath` when an intermediate has the wrong shape.
    pub fn set(&self, path: &JsonPath, value: Value) -> Result<()> {
        if path.is_root() && !value.is_object() {
            return Err(Error::usage(format!(
                "object data must be an object, got {}",
                value_type_name(&value)
            )));
        }
        set_at_path(&mut self.state.write().data, path, value)?;
        self.updates.emit(&());
        Ok(())
    }

    /// Remove the value at `path`, returning it
    pub fn delete_path(&self, path: &JsonPath) -> Option<Value> {
        if path.is_root() {
            return None;
        }
        let removed = delete_at_path(&mut self.state.write().data, path);
        if removed.is_some() {
            self.updates.emit(&());
        }
        removed
    }

    /// Tag the object with a foreign key. Returns false if already tagged.
    pub fn add_meta_key(&self, key: ForeignKey) -> bool {
        let inserted = self.state.write().meta.insert(key);
        if inserted {
            self.updates.emit(&());
        }
        inserted
    }

    /// Replace data and type in one step with a single notification
    pub(crate) fn replace_atomically(&self, data: Map<String, Value>, type_ref: Option<Dxn>) {
        {
            let mut state = self.state.write();
            state.data = Value::Object(data);
            state.type_ref = type_ref;
        }
        self.updates.emit(&());
    }

    pub(crate) fn set_deleted(&self, deleted: bool) -> bool {
        let changed = {
            let mut state = self.state.write();
            let changed = state.deleted != deleted;
            state.deleted = deleted;
            changed
        };
        if changed {
            self.updates.emit(&());
        }
        changed
    }
}

impl fmt::Debug for ObjectCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ObjectCore")
            .field("id", &self.id)
            .field("type_ref", &state.type_ref)
            .field("deleted", &state.deleted)
            .finish()
    }
}

// =============================================================================
// ObjectSnapshot
// =============================================================================

/// Immutable copy of an object's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    /// Object identity
    pub id: ObjectId,
    /// Declared type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_ref: Option<Dxn>,
    /// Data object
    pub data: Value,
    /// Metadata
    #[serde(default)]
    pub meta: ObjectMeta,
    /// Tombstone flag
    #[serde(default)]
    pub deleted: bool,
}

impl ObjectSnapshot {
    /// Value at `path` inside the data
    pub fn get(&self, path: &JsonPath) -> Option<&Value> {
        get_at_path(&self.data, path)
    }

    /// Top-level string property
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

// =============================================================================
// ObjectDraft
// =============================================================================

/// Input for creating an object
#[derive(Debug, Clone, Default)]
pub struct ObjectDraft {
    pub(crate) id: Option<ObjectId>,
    pub(crate) type_ref: Option<Dxn>,
    pub(crate) data: Value,
    pub(crate) meta: ObjectMeta,
}

impl ObjectDraft {
    /// Draft with the given data; the store assigns an id
    pub fn new(data: Value) -> Self {
        Self {
            id: None,
            type_ref: None,
            data,
            meta: ObjectMeta::default(),
        }
    }

    /// Draft with a declared type
    pub fn typed(type_ref: Dxn, data: Value) -> Self {
        Self::new(data).with_type(type_ref)
    }

    /// Use an explicit id
    pub fn with_id(mut self, id: ObjectId) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the declared type
    pub fn with_type(mut self, type_ref: Dxn) -> Self {
        self.type_ref = Some(type_ref);
        self
    }

    /// Add a foreign key
    pub fn with_meta_key(mut self, key: ForeignKey) -> Self {
        self.meta.insert(key);
        self
    }

    /// Declared type, if any
    pub fn type_ref(&self) -> Option<&Dxn> {
        self.type_ref.as_ref()
    }

    pub(crate) fn into_core(self) -> Result<ObjectCore> {
        let data = match self.data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::usage(format!(
                    "object data must be an object, got {}",
                    value_type_name(&other)
                )))
            }
        };
        let id = self.id.unwrap_or_else(ObjectId::random);
        Ok(ObjectCore::new(id, self.type_ref, data, self.meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tidepool_core::tracking::track;

    fn core(data: Value) -> ObjectCore {
        ObjectDraft::typed(Dxn::typed("example.com/type/Task", "0.1.0"), data)
            .into_core()
            .unwrap()
    }

    fn counter(core: &ObjectCore) -> (Arc<AtomicUsize>, tidepool_core::Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sub = core.updates().on(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, sub)
    }

    #[test]
    fn test_set_and_get() {
        let core = core(json!({"title": "a"}));
        core.set(&"title".into(), json!("b")).unwrap();
        core.set(&"tags[0]".parse().unwrap(), json!("x")).unwrap();
        assert_eq!(core.get(&"title".into()), Some(json!("b")));
        assert_eq!(core.data(), json!({"title": "b", "tags": ["x"]}));
    }

    #[test]
    fn test_mutations_emit_updates() {
        let core = core(json!({"title": "a"}));
        let (count, _sub) = counter(&core);

        core.set(&"title".into(), json!("b")).unwrap();
        assert!(core.delete_path(&"title".into()).is_some());
        assert!(core.delete_path(&"title".into()).is_none());
        assert!(core.add_meta_key(ForeignKey::new("github.com", "1")));
        assert!(!core.add_meta_key(ForeignKey::new("github.com", "1")));

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_replace_atomically_emits_once() {
        let core = core(json!({"title": "a"}));
        let (count, _sub) = counter(&core);
        let mut data = Map::new();
        data.insert("name".into(), json!("x"));
        core.replace_atomically(data, Some(Dxn::typed("example.com/type/Task", "0.2.0")));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        let snap = core.snapshot();
        assert_eq!(snap.data, json!({"name": "x"}));
        assert_eq!(snap.type_ref.unwrap().version(), Some("0.2.0"));
    }

    #[test]
    fn test_root_set_requires_object() {
        let core = core(json!({}));
        assert!(core.set(&JsonPath::root(), json!(1)).unwrap_err().is_usage());
        core.set(&JsonPath::root(), json!({"a": 1})).unwrap();
        assert_eq!(core.data(), json!({"a": 1}));
    }

    #[test]
    fn test_reads_are_tracked() {
        let core = core(json!({"title": "a"}));
        let (_, reads) = track(|| core.get(&"title".into()));
        assert!(reads.contains(core.id()));
    }

    #[test]
    fn test_draft_rejects_non_object_data() {
        let err = ObjectDraft::new(json!([1, 2])).into_core().unwrap_err();
        assert!(err.is_usage());
        let core = ObjectDraft::new(Value::Null).into_core().unwrap();
        assert_eq!(core.data(), json!({}));
    }
}
