//! Type records
//!
//! A [`TypeRecord`] wraps one type definition held by a registry. Static
//! records wrap an immutable [`TypeDefinition`]. Dynamic records are backed
//! by a stored schema object: they subscribe to the object's `updates` and
//! mark their cached [`SchemaSnapshot`] dirty on every change. The snapshot
//! is recomputed on the next read, never eagerly.
//!
//! ```text
//! registered ──update──► invalidated ──read──► registered
//!      │                                          │
//!      └──────────────── removed ◄────────────────┘
//! ```

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tidepool_core::{Dxn, Error, JsonPath, ObjectId, Result, Subscription};
use tidepool_storage::ObjectCore;
use tracing::trace;

use crate::definition::TypeDefinition;
use crate::json_schema::JsonSchema;
use crate::stored::StoredSchemaData;

/// Where a record's definition comes from
pub enum TypeSource {
    /// Immutable in-memory definition
    Static(TypeDefinition),
    /// Stored schema object
    Dynamic {
        /// The backing object
        backing: Arc<ObjectCore>,
    },
}

/// Lifecycle state of a [`TypeRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Snapshot is current
    Registered,
    /// Backing object changed since the snapshot was taken
    Invalidated,
    /// Dropped from its registry
    Removed,
}

/// Structural view of a record at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSnapshot {
    /// Typename
    pub typename: String,
    /// Version
    pub version: String,
    /// Structural schema
    pub json_schema: JsonSchema,
    /// Display name
    pub name: Option<String>,
}

impl SchemaSnapshot {
    fn from_definition(definition: &TypeDefinition) -> Self {
        Self {
            typename: definition.typename().to_string(),
            version: definition.version().to_string(),
            json_schema: definition.json_schema().clone(),
            name: None,
        }
    }

    fn from_stored(data: &Value) -> Self {
        let stored = StoredSchemaData::decode(data);
        Self {
            typename: stored.typename,
            version: stored.version,
            json_schema: stored.json_schema,
            name: stored.name,
        }
    }
}

/// Registry-held type definition, static or backed by a stored object
pub struct TypeRecord {
    source: TypeSource,
    cache: RwLock<Option<Arc<SchemaSnapshot>>>,
    dirty: AtomicBool,
    removed: AtomicBool,
    invalidation: Mutex<Option<Subscription>>,
}

impl TypeRecord {
    /// Static record for `definition`
    pub fn from_definition(definition: TypeDefinition) -> Arc<Self> {
        let snapshot = Arc::new(SchemaSnapshot::from_definition(&definition));
        Arc::new(Self {
            source: TypeSource::Static(definition),
            cache: RwLock::new(Some(snapshot)),
            dirty: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            invalidation: Mutex::new(None),
        })
    }

    /// Dynamic record backed by a stored schema object
    ///
    /// The record invalidates its snapshot whenever `backing` changes.
    pub fn from_backing(backing: Arc<ObjectCore>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<TypeRecord>| {
            let weak = weak.clone();
            let subscription = backing.updates().on(move |_| {
                if let Some(record) = weak.upgrade() {
                    record.invalidate();
                }
            });
            Self {
                source: TypeSource::Dynamic { backing },
                cache: RwLock::new(None),
                dirty: AtomicBool::new(true),
                removed: AtomicBool::new(false),
                invalidation: Mutex::new(Some(subscription)),
            }
        })
    }

    /// Definition source
    pub fn source(&self) -> &TypeSource {
        &self.source
    }

    /// Stable identifier: the backing object id, or the static type reference
    pub fn id(&self) -> String {
        match &self.source {
            TypeSource::Static(definition) => definition.static_type_ref().to_string(),
            TypeSource::Dynamic { backing } => backing.id().to_string(),
        }
    }

    /// Id of the backing object, `None` for static records
    pub fn backing_object_id(&self) -> Option<&ObjectId> {
        match &self.source {
            TypeSource::Static(_) => None,
            TypeSource::Dynamic { backing } => Some(backing.id()),
        }
    }

    /// Backing object, `None` for static records
    pub fn backing_object(&self) -> Option<&Arc<ObjectCore>> {
        match &self.source {
            TypeSource::Static(_) => None,
            TypeSource::Dynamic { backing } => Some(backing),
        }
    }

    /// Typename
    pub fn typename(&self) -> String {
        self.snapshot().typename.clone()
    }

    /// Version
    pub fn version(&self) -> String {
        self.snapshot().version.clone()
    }

    /// Structural schema
    pub fn json_schema(&self) -> JsonSchema {
        self.snapshot().json_schema.clone()
    }

    /// Display name
    pub fn name(&self) -> Option<String> {
        self.snapshot().name.clone()
    }

    /// True for records backed by a stored object
    pub fn is_mutable(&self) -> bool {
        matches!(self.source, TypeSource::Dynamic { .. })
    }

    /// Current snapshot, recomputed if the backing object changed
    pub fn snapshot(&self) -> Arc<SchemaSnapshot> {
        let backing = match &self.source {
            TypeSource::Dynamic { backing } => backing,
            TypeSource::Static(definition) => {
                return self
                    .cache
                    .read()
                    .clone()
                    .unwrap_or_else(|| Arc::new(SchemaSnapshot::from_definition(definition)))
            }
        };

        if !self.dirty.swap(false, Ordering::AcqRel) {
            if let Some(snapshot) = self.cache.read().clone() {
                return snapshot;
            }
        }
        let snapshot = Arc::new(SchemaSnapshot::from_stored(&backing.data()));
        *self.cache.write() = Some(Arc::clone(&snapshot));
        trace!(target: "tidepool::schema", id = %backing.id(), "recomputed schema snapshot");
        snapshot
    }

    /// Lifecycle state
    pub fn state(&self) -> RecordState {
        if self.removed.load(Ordering::Acquire) {
            RecordState::Removed
        } else if self.dirty.load(Ordering::Acquire) {
            RecordState::Invalidated
        } else {
            RecordState::Registered
        }
    }

    /// Type reference objects of this type carry
    ///
    /// `dxn:type:<typename>:<version>` for static records,
    /// `dxn:echo:@:<backing-id>` for dynamic ones.
    pub fn type_ref(&self) -> Dxn {
        match &self.source {
            TypeSource::Static(definition) => definition.static_type_ref(),
            TypeSource::Dynamic { backing } => Dxn::local_object(backing.id().clone()),
        }
    }

    /// Replace the structural schema of a mutable record
    ///
    /// The schema's `$id` is kept pointing at the backing object.
    ///
    /// # Errors
    ///
    /// `Error::Usage` on static records.
    pub fn update_json_schema(&self, mut json_schema: JsonSchema) -> Result<()> {
        let backing = self.require_mutable("update the schema of")?;
        json_schema.id = Some(Dxn::local_object(backing.id().clone()).to_string());
        backing.set(&JsonPath::from("jsonSchema"), json_schema.to_value())
    }

    /// Set the display name of a mutable record
    ///
    /// # Errors
    ///
    /// `Error::Usage` on static records.
    pub fn set_name(&self, name: impl Into<String>) -> Result<()> {
        let backing = self.require_mutable("rename")?;
        backing.set(&JsonPath::from("name"), Value::String(name.into()))
    }

    /// Static definition equivalent to the current snapshot
    pub fn to_definition(&self) -> TypeDefinition {
        match &self.source {
            TypeSource::Static(definition) => definition.clone(),
            TypeSource::Dynamic { backing } => {
                let snapshot = self.snapshot();
                TypeDefinition::new(snapshot.typename.clone(), snapshot.version.clone())
                    .with_json_schema(snapshot.json_schema.clone())
                    .with_identifier(Dxn::local_object(backing.id().clone()))
            }
        }
    }

    pub(crate) fn invalidate(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
        self.invalidation.lock().take();
    }

    fn require_mutable(&self, action: &str) -> Result<&Arc<ObjectCore>> {
        match &self.source {
            TypeSource::Dynamic { backing } => Ok(backing),
            TypeSource::Static(definition) => Err(Error::usage(format!(
                "Cannot {action} static schema '{}'",
                definition.typename()
            ))),
        }
    }
}

impl fmt::Debug for TypeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRecord")
            .field("id", &self.id())
            .field("mutable", &self.is_mutable())
            .field("state", &self.state())
            .finish()
    }
}
