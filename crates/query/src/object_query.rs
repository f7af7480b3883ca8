//! Object queries over an [`ObjectStore`]
//!
//! [`ObjectQueryResolver`] evaluates a filter against the store's objects.
//! While started it listens to store membership changes and to the `updates`
//! event of every object the last evaluation read, and fires its own change
//! event for each notification. A store change for an object that already
//! notified through its `updates` event is not reported a second time.
//! Dependencies are recomputed on every evaluation; reads made by custom
//! predicates are not dependencies.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use tidepool_core::tracking::track;
use tidepool_core::{Event, ObjectId, Result, Subscription};
use tidepool_storage::{ObjectCore, ObjectStore, StoreChange};
use tracing::{trace, warn};

use crate::filter::Filter;
use crate::matching::{matches, MatchContext};
use crate::prepared::{PreparedQuery, Resolver};

#[derive(Default)]
struct Watch {
    store: Option<Subscription>,
    objects: HashMap<ObjectId, Subscription>,
    /// Watched objects whose `updates` fired since their last store change
    notified: HashSet<ObjectId>,
}

struct Shared {
    store: Arc<dyn ObjectStore>,
    filter: Filter,
    changes: Event<()>,
    watch: Mutex<Watch>,
}

impl Shared {
    fn evaluate(self: &Arc<Self>, objects: Vec<Arc<ObjectCore>>) -> Result<Vec<Arc<ObjectCore>>> {
        let ctx = MatchContext::new(self.store.namespace());
        let (result, reads) = track(|| {
            let mut matched = Vec::new();
            for core in &objects {
                if matches(&self.filter, core, &ctx)? {
                    matched.push(Arc::clone(core));
                }
            }
            Ok::<_, tidepool_core::Error>(matched)
        });
        self.refresh_dependencies(&objects, reads);
        result
    }

    fn refresh_dependencies(self: &Arc<Self>, objects: &[Arc<ObjectCore>], reads: BTreeSet<ObjectId>) {
        let mut watch = self.watch.lock();
        if watch.store.is_none() {
            return;
        }

        watch.objects.retain(|id, _| reads.contains(id));
        let by_id: HashMap<&ObjectId, &Arc<ObjectCore>> =
            objects.iter().map(|core| (core.id(), core)).collect();
        for id in reads {
            if watch.objects.contains_key(&id) {
                continue;
            }
            let core = match by_id.get(&id) {
                Some(core) => Arc::clone(core),
                None => match self.store.get_by_id(&id) {
                    Some(core) => core,
                    None => continue,
                },
            };
            let weak = Arc::downgrade(self);
            let notified_id = id.clone();
            let subscription = core.updates().on(move |_| {
                if let Some(shared) = weak.upgrade() {
                    shared.watch.lock().notified.insert(notified_id.clone());
                    shared.changes.emit(&());
                }
            });
            watch.objects.insert(id, subscription);
        }
        trace!(target: "tidepool::query", watched = watch.objects.len(), "refreshed dependencies");
    }

    fn on_store_change(self: &Arc<Self>, change: &StoreChange) {
        let marked = self.watch.lock().notified.remove(change.object_id());
        // Removal and replacement fire the object's `updates` first.
        let notified = marked && matches!(change, StoreChange::Removed(_) | StoreChange::Replaced(_));
        if let Err(e) = self.evaluate(self.store.loaded_objects()) {
            warn!(target: "tidepool::query", error = %e, "re-evaluation after store change failed");
        }
        if !notified {
            self.changes.emit(&());
        }
    }
}

/// Store-backed resolver for object queries
pub struct ObjectQueryResolver {
    shared: Arc<Shared>,
}

impl ObjectQueryResolver {
    /// Resolver for `filter` over `store`
    pub fn new(store: Arc<dyn ObjectStore>, filter: Filter) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                filter,
                changes: Event::new(),
                watch: Mutex::new(Watch::default()),
            }),
        }
    }

    /// Filter being evaluated
    pub fn filter(&self) -> &Filter {
        &self.shared.filter
    }

    /// Number of objects currently watched for updates
    pub fn watched_objects(&self) -> usize {
        self.shared.watch.lock().objects.len()
    }
}

#[async_trait]
impl Resolver<Arc<ObjectCore>> for ObjectQueryResolver {
    fn results_sync(&self) -> Result<Vec<Arc<ObjectCore>>> {
        self.shared.evaluate(self.shared.store.loaded_objects())
    }

    async fn results(&self) -> Result<Vec<Arc<ObjectCore>>> {
        let objects = self.shared.store.load_all().await?;
        self.shared.evaluate(objects)
    }

    async fn start(&self) -> Result<()> {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let subscription = self.shared.store.changes().on(move |change| {
            if let Some(shared) = weak.upgrade() {
                trace!(target: "tidepool::query", id = %change.object_id(), "store changed");
                shared.on_store_change(change);
            }
        });
        self.shared.watch.lock().store = Some(subscription);
        self.shared.evaluate(self.shared.store.loaded_objects())?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut watch = self.shared.watch.lock();
        watch.store = None;
        watch.objects.clear();
        watch.notified.clear();
        Ok(())
    }

    fn changes(&self) -> &Event<()> {
        &self.shared.changes
    }
}

impl fmt::Debug for ObjectQueryResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectQueryResolver")
            .field("filter", &self.shared.filter)
            .field("watched", &self.watched_objects())
            .finish()
    }
}

/// Prepared query over the objects of `store` matching `filter`
pub fn query_objects(store: Arc<dyn ObjectStore>, filter: Filter) -> PreparedQuery<Arc<ObjectCore>> {
    PreparedQuery::new(Arc::new(ObjectQueryResolver::new(store, filter)))
}
