//! Schema registry
//!
//! One [`SchemaRegistry`] indexes the type records of one object store. It
//! combines two sources:
//!
//! - static records from a shared [`RuntimeSchemaRegistry`]
//! - dynamic records backed by stored schema objects
//!
//! Dynamic records are created through get-or-create on the backing object
//! id, so a registry never holds two records for the same stored schema.
//! When opened with a reactive query, the registry watches the stored schema
//! set, registers new objects, drops records whose objects disappeared and
//! fires a list-changed notification whenever either set is non-empty.
//!
//! # Integrity
//!
//! Stored schemas whose JSON schema lacks `$id` or is not of object type are
//! excluded from query results with a warning. Lookups by id do not apply
//! this check; they only reject objects that are not stored schemas.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tidepool_core::{
    ensure_exact_version, Dxn, Error, Event, ObjectId, Result, Subscription, LOCAL_SPACE_TAG,
};
use tidepool_query::{query_objects, PreparedQuery, QuerySubscription, Resolver, SubscribeOptions};
use tidepool_storage::{ObjectCore, ObjectStore};
use tracing::{debug, warn};

use crate::declaration::SchemaDeclaration;
use crate::definition::TypeDefinition;
use crate::json_schema::JsonSchema;
use crate::record::TypeRecord;
use crate::runtime::RuntimeSchemaRegistry;
use crate::stored::{is_stored_schema, stored_schema_filter, StoredSchemaData, SYSTEM_TYPENAMES};

// =============================================================================
// Options and inputs
// =============================================================================

/// Where schema queries look for records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaLocation {
    /// Static records of the runtime registry
    Runtime,
    /// Records backed by stored schema objects
    Database,
}

/// Registry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistryOptions {
    /// Keep a standing query over stored schemas while open
    pub reactive_query: bool,
    /// Load and register every stored schema on open
    pub preload_on_open: bool,
    /// Locations searched by queries that do not name any
    pub default_locations: Vec<SchemaLocation>,
}

impl Default for SchemaRegistryOptions {
    fn default() -> Self {
        Self {
            reactive_query: true,
            preload_on_open: true,
            default_locations: vec![SchemaLocation::Runtime, SchemaLocation::Database],
        }
    }
}

/// Selection of schema records
///
/// Empty lists place no constraint. Within a list any entry may match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaQuery {
    /// Record ids; for stored schemas the JSON schema `$id` also matches
    pub id: Vec<String>,
    /// Typenames
    pub typename: Vec<String>,
    /// Backing object ids
    pub backing_object_id: Vec<ObjectId>,
    /// Exact version
    pub version: Option<String>,
    /// Locations to search; `None` uses the registry default
    pub location: Option<Vec<SchemaLocation>>,
    /// Include system schemas
    pub include_system: bool,
}

impl SchemaQuery {
    /// Query matching every non-system record
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a record id
    pub fn by_id(mut self, id: impl Into<String>) -> Self {
        self.id.push(id.into());
        self
    }

    /// Restrict to a typename
    pub fn by_typename(mut self, typename: impl Into<String>) -> Self {
        self.typename.push(typename.into());
        self
    }

    /// Restrict to a backing object
    pub fn by_backing_object_id(mut self, id: ObjectId) -> Self {
        self.backing_object_id.push(id);
        self
    }

    /// Restrict to an exact version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Search only the given locations
    pub fn in_locations(mut self, locations: Vec<SchemaLocation>) -> Self {
        self.location = Some(locations);
        self
    }

    /// Include system schemas
    pub fn including_system(mut self) -> Self {
        self.include_system = true;
        self
    }
}

/// Input to [`SchemaRegistry::register`]
#[derive(Debug, Clone)]
pub enum RegisterSchemaInput {
    /// An in-memory definition, stored as a new schema object
    Definition(TypeDefinition),
    /// Typename, version and JSON schema of a new stored schema
    Triple {
        /// Typename
        typename: String,
        /// Version
        version: String,
        /// Structural schema
        json_schema: JsonSchema,
        /// Display name
        name: Option<String>,
    },
    /// Untyped JSON holding `typename`, `version` and `jsonSchema`
    Json(Value),
}

impl From<TypeDefinition> for RegisterSchemaInput {
    fn from(definition: TypeDefinition) -> Self {
        RegisterSchemaInput::Definition(definition)
    }
}

impl From<Value> for RegisterSchemaInput {
    fn from(value: Value) -> Self {
        RegisterSchemaInput::Json(value)
    }
}

fn invalid_schema() -> Error {
    Error::usage("Invalid schema")
}

fn parse_register_json(value: &Value) -> Result<(TypeDefinition, Option<String>)> {
    let typename = value.get("typename").and_then(Value::as_str);
    let version = value.get("version").and_then(Value::as_str);
    let json_schema = value.get("jsonSchema").filter(|v| v.is_object());
    match (typename, version, json_schema) {
        (Some(typename), Some(version), Some(json_schema)) => {
            let json_schema = JsonSchema::from_value(json_schema).map_err(|_| invalid_schema())?;
            let name = value.get("name").and_then(Value::as_str).map(str::to_string);
            Ok((
                TypeDefinition::new(typename, version).with_json_schema(json_schema),
                name,
            ))
        }
        _ => Err(invalid_schema()),
    }
}

// =============================================================================
// Registry state
// =============================================================================

#[derive(Default)]
struct Index {
    by_id: HashMap<ObjectId, Arc<TypeRecord>>,
    by_typename: HashMap<String, Vec<ObjectId>>,
    order: Vec<ObjectId>,
}

impl Index {
    fn insert(&mut self, typename: String, record: Arc<TypeRecord>, id: ObjectId) {
        self.by_typename.entry(typename).or_default().push(id.clone());
        self.order.push(id.clone());
        self.by_id.insert(id, record);
    }

    fn remove(&mut self, id: &ObjectId) -> Option<Arc<TypeRecord>> {
        let record = self.by_id.remove(id)?;
        self.order.retain(|entry| entry != id);
        self.by_typename.retain(|_, ids| {
            ids.retain(|entry| entry != id);
            !ids.is_empty()
        });
        Some(record)
    }

    fn records(&self) -> Vec<Arc<TypeRecord>> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect()
    }
}

struct RegistryInner {
    store: Arc<dyn ObjectStore>,
    runtime: Arc<RuntimeSchemaRegistry>,
    options: SchemaRegistryOptions,
    index: RwLock<Index>,
    list_changed: Event<Vec<Arc<TypeRecord>>>,
    stored: PreparedQuery<Arc<ObjectCore>>,
    standing: Mutex<Option<QuerySubscription<Arc<ObjectCore>>>>,
    open: AtomicBool,
}

impl RegistryInner {
    /// Get-or-create the record for a stored schema object
    fn register_core(&self, core: Arc<ObjectCore>) -> (Arc<TypeRecord>, bool) {
        let mut index = self.index.write();
        if let Some(existing) = index.by_id.get(core.id()) {
            return (Arc::clone(existing), false);
        }
        let id = core.id().clone();
        let typename = StoredSchemaData::decode(&core.data()).typename;
        let record = TypeRecord::from_backing(core);
        debug!(target: "tidepool::schema", %id, %typename, "registered stored schema");
        index.insert(typename, Arc::clone(&record), id);
        (record, true)
    }

    fn unregister(&self, id: &ObjectId) -> Option<Arc<TypeRecord>> {
        let record = self.index.write().remove(id)?;
        record.mark_removed();
        debug!(target: "tidepool::schema", %id, "unregistered stored schema");
        Some(record)
    }

    fn records(&self) -> Vec<Arc<TypeRecord>> {
        self.index.read().records()
    }

    fn notify(&self) {
        let records = self.records();
        debug!(target: "tidepool::schema", records = records.len(), "schema list changed");
        self.list_changed.emit(&records);
    }

    fn subscribe_list_changed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Vec<Arc<TypeRecord>>) + Send + Sync + 'static,
    {
        listener(&self.records());
        self.list_changed.on(listener)
    }

    /// Reconcile the index with the current stored schema set
    fn sync_with(&self, stored: Vec<Arc<ObjectCore>>) {
        let current: HashSet<ObjectId> = stored.iter().map(|core| core.id().clone()).collect();
        let added = stored
            .into_iter()
            .filter(|core| self.register_core(Arc::clone(core)).1)
            .count();

        let stale: Vec<ObjectId> = self
            .index
            .read()
            .order
            .iter()
            .filter(|id| !current.contains(*id))
            .cloned()
            .collect();
        let removed = stale.iter().filter_map(|id| self.unregister(id)).count();

        if added > 0 || removed > 0 {
            debug!(target: "tidepool::schema", added, removed, "stored schema set changed");
            self.notify();
        }
    }

    fn lookup_stored(&self, core: Option<Arc<ObjectCore>>, id: &str) -> Option<Arc<TypeRecord>> {
        let core = core.filter(|core| !core.is_deleted())?;
        if !is_stored_schema(&core) {
            warn!(target: "tidepool::schema", %id, "type object is not a stored schema");
            return None;
        }
        Some(self.register_core(core).0)
    }

    fn select(&self, query: &SchemaQuery, stored: Vec<Arc<ObjectCore>>) -> Result<Vec<Arc<TypeRecord>>> {
        if let Some(version) = &query.version {
            ensure_exact_version(version)?;
        }
        let locations = query
            .location
            .as_ref()
            .unwrap_or(&self.options.default_locations);

        let mut selected: Vec<Arc<TypeRecord>> = Vec::new();
        if locations.contains(&SchemaLocation::Runtime) {
            for record in self.runtime.records() {
                let snapshot = record.snapshot();
                if !query.include_system && SYSTEM_TYPENAMES.contains(&snapshot.typename.as_str()) {
                    continue;
                }
                if !query.id.is_empty() && !query.id.contains(&record.id()) {
                    continue;
                }
                if !query.backing_object_id.is_empty() {
                    continue;
                }
                if !query.typename.is_empty() && !query.typename.contains(&snapshot.typename) {
                    continue;
                }
                if query.version.as_ref().is_some_and(|v| *v != snapshot.version) {
                    continue;
                }
                selected.push(record);
            }
        }

        if locations.contains(&SchemaLocation::Database) {
            for core in stored {
                let (record, _) = self.register_core(core);
                let snapshot = record.snapshot();
                if let Err(issue) = snapshot.json_schema.check_integrity() {
                    warn!(target: "tidepool::schema", id = %record.id(), %issue, "excluding malformed stored schema");
                    continue;
                }
                if !query.include_system && SYSTEM_TYPENAMES.contains(&snapshot.typename.as_str()) {
                    continue;
                }
                if !query.id.is_empty() {
                    let record_id = record.id();
                    let schema_id = snapshot.json_schema.id.as_deref();
                    let hit = query
                        .id
                        .iter()
                        .any(|id| *id == record_id || Some(id.as_str()) == schema_id);
                    if !hit {
                        continue;
                    }
                }
                if !query.backing_object_id.is_empty()
                    && !record
                        .backing_object_id()
                        .is_some_and(|id| query.backing_object_id.contains(id))
                {
                    continue;
                }
                if !query.typename.is_empty() && !query.typename.contains(&snapshot.typename) {
                    continue;
                }
                if query.version.as_ref().is_some_and(|v| *v != snapshot.version) {
                    continue;
                }
                selected.push(record);
            }
        }

        let mut keyed: Vec<(String, Arc<TypeRecord>)> = selected
            .into_iter()
            .map(|record| {
                let snapshot = record.snapshot();
                let key = format!("{}:{}:{}", snapshot.typename, snapshot.version, record.id());
                (key, record)
            })
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(keyed.into_iter().map(|(_, record)| record).collect())
    }
}

// =============================================================================
// Schema queries
// =============================================================================

struct SchemaQueryResolver {
    registry: Weak<RegistryInner>,
    query: SchemaQuery,
    changes: Event<()>,
    listening: Mutex<Option<Subscription>>,
}

#[async_trait]
impl Resolver<Arc<TypeRecord>> for SchemaQueryResolver {
    fn results_sync(&self) -> Result<Vec<Arc<TypeRecord>>> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(Vec::new());
        };
        let stored = registry.stored.run_sync()?;
        registry.select(&self.query, stored)
    }

    async fn results(&self) -> Result<Vec<Arc<TypeRecord>>> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(Vec::new());
        };
        let stored = registry.stored.run().await?;
        registry.select(&self.query, stored)
    }

    async fn start(&self) -> Result<()> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(());
        };
        let changes = self.changes.clone();
        let subscription = registry.subscribe_list_changed(move |_| changes.emit(&()));
        *self.listening.lock() = Some(subscription);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.listening.lock().take();
        Ok(())
    }

    fn changes(&self) -> &Event<()> {
        &self.changes
    }
}

// =============================================================================
// SchemaRegistry
// =============================================================================

/// Type records of one object store
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct SchemaRegistry {
    inner: Arc<RegistryInner>,
}

impl SchemaRegistry {
    /// Registry over `store`, sharing static records from `runtime`
    pub fn new(
        store: Arc<dyn ObjectStore>,
        runtime: Arc<RuntimeSchemaRegistry>,
        options: SchemaRegistryOptions,
    ) -> Self {
        let stored = query_objects(Arc::clone(&store), stored_schema_filter());
        Self {
            inner: Arc::new(RegistryInner {
                store,
                runtime,
                options,
                index: RwLock::new(Index::default()),
                list_changed: Event::new(),
                stored,
                standing: Mutex::new(None),
                open: AtomicBool::new(false),
            }),
        }
    }

    /// Load stored schemas and start watching them
    ///
    /// Opening an open registry does nothing.
    pub async fn open(&self) -> Result<()> {
        if self.inner.open.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if self.inner.options.preload_on_open {
            let stored = self.inner.stored.run().await?;
            let added = stored
                .into_iter()
                .filter(|core| self.inner.register_core(Arc::clone(core)).1)
                .count();
            if added > 0 {
                self.inner.notify();
            }
        }

        if self.inner.options.reactive_query {
            let weak = Arc::downgrade(&self.inner);
            let subscription = self.inner.stored.subscribe(
                move |query| {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    match query.results() {
                        Ok(stored) => inner.sync_with(stored),
                        Err(e) => {
                            warn!(target: "tidepool::schema", error = %e, "stored schema query failed")
                        }
                    }
                },
                SubscribeOptions::fire(),
            );
            *self.inner.standing.lock() = Some(subscription);
            self.inner.stored.settle().await;
        }

        debug!(target: "tidepool::schema", records = self.inner.records().len(), "schema registry opened");
        Ok(())
    }

    /// Stop watching stored schemas
    pub async fn close(&self) -> Result<()> {
        if !self.inner.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let standing = self.inner.standing.lock().take();
        drop(standing);
        self.inner.stored.settle().await;
        debug!(target: "tidepool::schema", "schema registry closed");
        Ok(())
    }

    /// True between `open` and `close`
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Register schemas, storing a new schema object for each new input
    ///
    /// A definition whose identifier names an already registered stored
    /// schema returns that record instead of creating another.
    ///
    /// # Errors
    ///
    /// `Error::Usage` ("Invalid schema") for inputs without a typename or
    /// without the triple fields; `Error::Unsupported` for range versions.
    pub fn register<I>(&self, inputs: I) -> Result<Vec<Arc<TypeRecord>>>
    where
        I: IntoIterator<Item = RegisterSchemaInput>,
    {
        inputs
            .into_iter()
            .map(|input| self.register_one(input))
            .collect()
    }

    fn register_one(&self, input: RegisterSchemaInput) -> Result<Arc<TypeRecord>> {
        let (definition, name) = match input {
            RegisterSchemaInput::Definition(definition) => {
                if let Some(id) = definition.backing_object_id() {
                    if let Some(existing) = self.inner.index.read().by_id.get(id).cloned() {
                        return Ok(existing);
                    }
                    if let Some(core) = self.inner.store.get_by_id(id) {
                        if is_stored_schema(&core) && !core.is_deleted() {
                            return self.register_stored_object(core);
                        }
                    }
                }
                (definition, None)
            }
            RegisterSchemaInput::Triple {
                typename,
                version,
                json_schema,
                name,
            } => (
                TypeDefinition::new(typename, version).with_json_schema(json_schema),
                name,
            ),
            RegisterSchemaInput::Json(value) => parse_register_json(&value)?,
        };

        if definition.typename().is_empty() || definition.version().is_empty() {
            return Err(invalid_schema());
        }
        ensure_exact_version(definition.version())?;

        let core = self
            .inner
            .store
            .add(StoredSchemaData::draft_for(&definition, name)?)?;
        let (record, created) = self.inner.register_core(core);
        if created {
            self.inner.notify();
        }
        Ok(record)
    }

    /// Get-or-create the record for a stored schema object
    ///
    /// # Errors
    ///
    /// `Error::Usage` if `core` is not a stored schema.
    pub fn register_stored_object(&self, core: Arc<ObjectCore>) -> Result<Arc<TypeRecord>> {
        if !is_stored_schema(&core) {
            return Err(Error::usage(format!(
                "Object {} is not a stored schema",
                core.id()
            )));
        }
        let (record, created) = self.inner.register_core(core);
        if created {
            self.inner.notify();
        }
        Ok(record)
    }

    /// Prepared query over schema records
    pub fn query(&self, query: SchemaQuery) -> PreparedQuery<Arc<TypeRecord>> {
        PreparedQuery::new(Arc::new(SchemaQueryResolver {
            registry: Arc::downgrade(&self.inner),
            query,
            changes: Event::new(),
            listening: Mutex::new(None),
        }))
    }

    /// Record by id from loaded data
    ///
    /// Accepts a backing object id, a `dxn:echo:@:<id>` reference, or the
    /// `dxn:type:..` id of a static record. Objects that are not stored
    /// schemas are reported with a warning and yield `None`.
    pub fn get_schema_by_id(&self, id: &str) -> Option<Arc<TypeRecord>> {
        match self.resolve_id(id)? {
            ResolvedId::Static(record) => Some(record),
            ResolvedId::Object(object_id) => {
                if let Some(record) = self.inner.index.read().by_id.get(&object_id).cloned() {
                    return Some(record);
                }
                let core = self.inner.store.get_by_id(&object_id);
                self.inner.lookup_stored(core, id)
            }
        }
    }

    /// Record by id, loading the backing object if needed
    pub async fn load_schema_by_id(&self, id: &str) -> Result<Option<Arc<TypeRecord>>> {
        match self.resolve_id(id) {
            None => Ok(None),
            Some(ResolvedId::Static(record)) => Ok(Some(record)),
            Some(ResolvedId::Object(object_id)) => {
                if let Some(record) = self.inner.index.read().by_id.get(&object_id).cloned() {
                    return Ok(Some(record));
                }
                let core = self.inner.store.load_by_id(&object_id).await?;
                Ok(self.inner.lookup_stored(core, id))
            }
        }
    }

    fn resolve_id(&self, id: &str) -> Option<ResolvedId> {
        if !id.starts_with("dxn:") {
            return Some(ResolvedId::Object(ObjectId::from(id)));
        }
        match Dxn::parse(id).ok()? {
            Dxn::Type { typename, version } => self
                .inner
                .runtime
                .get(&typename, version.as_deref())
                .map(ResolvedId::Static),
            Dxn::Object { space, object_id } => {
                let namespace = self.inner.store.namespace();
                if space != LOCAL_SPACE_TAG && space != namespace.as_str() {
                    return None;
                }
                Some(ResolvedId::Object(object_id))
            }
        }
    }

    /// Latest record with `typename`
    ///
    /// Checks the stored-schema index first, then falls back to a query over
    /// loaded data that also covers static records. Either way the most
    /// recently registered match wins.
    pub fn get_schema_by_typename(&self, typename: &str) -> Option<Arc<TypeRecord>> {
        let indexed = {
            let index = self.inner.index.read();
            index.by_typename.get(typename).and_then(|ids| {
                ids.iter()
                    .rev()
                    .filter_map(|id| index.by_id.get(id))
                    .find(|record| record.typename() == typename)
                    .cloned()
            })
        };
        if indexed.is_some() {
            return indexed;
        }
        self.query(SchemaQuery::new().by_typename(typename))
            .run_sync()
            .ok()
            .and_then(|records| records.into_iter().last())
    }

    /// True if the declared schema is registered here or in the runtime registry
    pub fn has_schema(&self, declaration: &dyn SchemaDeclaration) -> bool {
        if let Some(id) = declaration.declared_backing_object_id() {
            return self.inner.index.read().by_id.contains_key(&id);
        }
        match declaration.type_reference() {
            Some(Dxn::Type { typename, version }) => {
                self.inner.runtime.get(&typename, version.as_deref()).is_some()
            }
            _ => false,
        }
    }

    /// Listen for changes of the stored schema set
    ///
    /// The listener runs immediately with the current records.
    #[must_use = "dropping the subscription unsubscribes"]
    pub fn subscribe_list_changed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Vec<Arc<TypeRecord>>) + Send + Sync + 'static,
    {
        self.inner.subscribe_list_changed(listener)
    }

    /// Records of registered stored schemas, in registration order
    pub fn records(&self) -> Vec<Arc<TypeRecord>> {
        self.inner.records()
    }

    /// Shared static registry
    pub fn runtime(&self) -> &Arc<RuntimeSchemaRegistry> {
        &self.inner.runtime
    }

    /// Options in effect
    pub fn options(&self) -> &SchemaRegistryOptions {
        &self.inner.options
    }
}

enum ResolvedId {
    Static(Arc<TypeRecord>),
    Object(ObjectId),
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("namespace", self.inner.store.namespace())
            .field("records", &self.inner.index.read().order.len())
            .field("open", &self.is_open())
            .finish()
    }
}
