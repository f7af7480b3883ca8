//! Object migrations
//!
//! A [`MigrationSpec`] moves every object of one type to another type by
//! rewriting its data. [`Database::run_migrations`] applies specs in order:
//!
//! 1. query objects of `from_type`
//! 2. run the transform on a snapshot of each object
//! 3. drop any `id` key from the transform output
//! 4. replace data and type in one atomic store update
//! 5. check the object now carries `to_type`
//! 6. run the `on_migration` hook
//!
//! Later specs see the output of earlier ones, so `[A→B, B→C]` takes A objects
//! to C in one call. A second run over migrated data finds no `from_type`
//! objects and changes nothing.
//!
//! The hook is not idempotent. When several peers migrate the same data
//! concurrently, its side effects may be applied more than once; callers that
//! care must deduplicate.

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tidepool_core::json::value_type_name;
use tidepool_core::{Dxn, Error, ObjectId, Result};
use tidepool_query::filter::ID_KEY;
use tidepool_query::Filter;
use tidepool_schema::{SchemaDeclaration, SchemaRegistry};
use tidepool_storage::{ObjectCore, ObjectSnapshot};
use tracing::{debug, info};

use crate::database::Database;

/// Boxed transform from an old object snapshot to new object data
pub type TransformFn =
    Arc<dyn Fn(ObjectSnapshot, MigrationContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Boxed post-migration hook
pub type MigrationHook = Arc<dyn Fn(MigrationEvent) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Read-only view handed to transforms
///
/// Transforms compute new data; they cannot write to the store.
#[derive(Clone)]
pub struct MigrationContext {
    db: Database,
    from_type: Dxn,
    to_type: Dxn,
}

impl MigrationContext {
    /// Type being migrated from
    pub fn from_type(&self) -> &Dxn {
        &self.from_type
    }

    /// Type being migrated to
    pub fn to_type(&self) -> &Dxn {
        &self.to_type
    }

    /// Snapshot of another loaded object
    pub fn get_object(&self, id: &ObjectId) -> Option<ObjectSnapshot> {
        self.db.get_object_by_id(id).map(|core| core.snapshot())
    }

    /// Schema registry of the database being migrated
    pub fn schema_registry(&self) -> &SchemaRegistry {
        self.db.schema_registry()
    }
}

impl fmt::Debug for MigrationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationContext")
            .field("from_type", &self.from_type)
            .field("to_type", &self.to_type)
            .finish()
    }
}

/// Argument of the post-migration hook
#[derive(Clone)]
pub struct MigrationEvent {
    /// Object state before the migration
    pub before: ObjectSnapshot,
    /// The migrated object
    pub object: Arc<ObjectCore>,
    /// Database the object lives in
    pub db: Database,
}

impl fmt::Debug for MigrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationEvent")
            .field("before", &self.before)
            .field("object", &self.object)
            .finish()
    }
}

/// Declarative migration between two types
#[derive(Clone)]
pub struct MigrationSpec {
    from_type: Dxn,
    to_type: Dxn,
    transform: TransformFn,
    on_migration: Option<MigrationHook>,
}

impl MigrationSpec {
    /// Define a migration from one declared type to another
    ///
    /// # Errors
    ///
    /// `Error::Usage` if either declaration has no type reference.
    pub fn define<F, Fut>(
        from: &dyn SchemaDeclaration,
        to: &dyn SchemaDeclaration,
        transform: F,
    ) -> Result<Self>
    where
        F: Fn(ObjectSnapshot, MigrationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let from_type = from
            .type_reference()
            .ok_or_else(|| Error::usage("Migration source schema has no type reference"))?;
        let to_type = to
            .type_reference()
            .ok_or_else(|| Error::usage("Migration target schema has no type reference"))?;
        Ok(Self {
            from_type,
            to_type,
            transform: Arc::new(move |snapshot, ctx| transform(snapshot, ctx).boxed()),
            on_migration: None,
        })
    }

    /// Run `hook` after each object is migrated
    pub fn on_migration<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(MigrationEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_migration = Some(Arc::new(move |event| hook(event).boxed()));
        self
    }

    /// Source type
    pub fn from_type(&self) -> &Dxn {
        &self.from_type
    }

    /// Target type
    pub fn to_type(&self) -> &Dxn {
        &self.to_type
    }
}

impl fmt::Debug for MigrationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationSpec")
            .field("from_type", &self.from_type)
            .field("to_type", &self.to_type)
            .field("on_migration", &self.on_migration.is_some())
            .finish()
    }
}

impl Database {
    /// Apply migrations in order
    ///
    /// # Errors
    ///
    /// Stops at the first failing transform, hook or store update. Objects
    /// migrated before the failure stay migrated.
    pub async fn run_migrations(&self, specs: &[MigrationSpec]) -> Result<()> {
        for spec in specs {
            let objects = self
                .query(Filter::type_ref(spec.from_type.clone()))
                .run()
                .await?;
            info!(
                target: "tidepool::migration",
                from = %spec.from_type,
                to = %spec.to_type,
                objects = objects.len(),
                "running migration"
            );
            for object in objects {
                self.migrate_object(spec, object).await?;
            }
        }

        if self.config().migration.flush_after_run {
            self.flush().await?;
        }
        Ok(())
    }

    async fn migrate_object(&self, spec: &MigrationSpec, object: Arc<ObjectCore>) -> Result<()> {
        let before = object.snapshot();
        let ctx = MigrationContext {
            db: self.clone(),
            from_type: spec.from_type.clone(),
            to_type: spec.to_type.clone(),
        };

        let mut data = match (spec.transform)(before.clone(), ctx).await? {
            Value::Object(map) => map,
            other => {
                return Err(Error::usage(format!(
                    "Migration transform must return an object, got {}",
                    value_type_name(&other)
                )))
            }
        };
        data.remove(ID_KEY);

        self.store()
            .replace_data(object.id(), Value::Object(data), Some(spec.to_type.clone()))?;
        if object.type_ref().as_ref() != Some(&spec.to_type) {
            return Err(Error::invariant(format!(
                "Object {} has type {:?} after migration to {}",
                object.id(),
                object.type_ref(),
                spec.to_type
            )));
        }
        debug!(target: "tidepool::migration", id = %object.id(), to = %spec.to_type, "migrated object");

        if let Some(hook) = &spec.on_migration {
            hook(MigrationEvent {
                before,
                object,
                db: self.clone(),
            })
            .await?;
        }
        Ok(())
    }
}
