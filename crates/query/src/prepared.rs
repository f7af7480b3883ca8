//! PreparedQuery: reactive, reference-counted query handle
//!
//! A [`PreparedQuery`] wraps a [`Resolver`] and manages its lifecycle:
//!
//! - the first subscriber schedules `start`, the last unsubscribe schedules `stop`
//! - transitions are queued in the order the subscriber count changed and
//!   drained under an async mutex, so `start` and `stop` never overlap and a
//!   `stop` queued after a `start` runs only once the `start` has finished
//! - a transition that would not change the resolver state is skipped, so a
//!   resolver is never started twice or stopped twice
//!
//! Inside a tokio runtime transitions run on spawned tasks; [`PreparedQuery::settle`]
//! awaits them. Outside a runtime they run to completion before `subscribe`
//! or the unsubscribe returns.
//!
//! # Synchronous Access
//!
//! [`PreparedQuery::results`] is only valid while the query has subscribers
//! or while a fire-on-subscribe callback runs. [`PreparedQuery::run_sync`] is
//! always available but sees only what the store has loaded.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tidepool_core::{Error, Event, Result, Subscription};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Source of results for a [`PreparedQuery`]
#[async_trait]
pub trait Resolver<T>: Send + Sync {
    /// Results computed from already loaded data
    fn results_sync(&self) -> Result<Vec<T>>;

    /// Results after loading everything the query needs
    async fn results(&self) -> Result<Vec<T>>;

    /// Begin watching for changes
    async fn start(&self) -> Result<()>;

    /// Stop watching for changes
    async fn stop(&self) -> Result<()>;

    /// Fired when the results may have changed
    fn changes(&self) -> &Event<()>;
}

/// Callback invoked with the query whenever its results may have changed
pub type QueryCallback<T> = Arc<dyn Fn(&PreparedQuery<T>) + Send + Sync>;

/// Options for [`PreparedQuery::subscribe`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Invoke the callback immediately with the current state
    pub fire: bool,
}

impl SubscribeOptions {
    /// Options that fire the callback on subscribe
    pub fn fire() -> Self {
        Self { fire: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Start,
    Stop,
}

struct Subscribers<T> {
    next_id: u64,
    callbacks: Vec<(u64, QueryCallback<T>)>,
    transitions: VecDeque<Transition>,
}

struct Shared<T> {
    resolver: Arc<dyn Resolver<T>>,
    subscribers: Mutex<Subscribers<T>>,
    lifecycle: tokio::sync::Mutex<()>,
    running: AtomicBool,
    firing: AtomicUsize,
    pending: Mutex<Vec<JoinHandle<()>>>,
    resolver_changes: Mutex<Option<Subscription>>,
}

impl<T: Send + Sync + 'static> Shared<T> {
    async fn drain_transitions(self: Arc<Self>) {
        let _lifecycle = self.lifecycle.lock().await;
        loop {
            let next = self.subscribers.lock().transitions.pop_front();
            let Some(transition) = next else {
                break;
            };
            let running = self.running.load(Ordering::Acquire);
            match transition {
                Transition::Start if !running => match self.resolver.start().await {
                    Ok(()) => {
                        self.running.store(true, Ordering::Release);
                        debug!(target: "tidepool::query", "resolver started");
                    }
                    Err(e) => warn!(target: "tidepool::query", error = %e, "resolver start failed"),
                },
                Transition::Stop if running => match self.resolver.stop().await {
                    Ok(()) => {
                        self.running.store(false, Ordering::Release);
                        debug!(target: "tidepool::query", "resolver stopped");
                    }
                    Err(e) => warn!(target: "tidepool::query", error = %e, "resolver stop failed"),
                },
                _ => {}
            }
        }
    }

    fn callbacks(&self) -> Vec<QueryCallback<T>> {
        self.subscribers
            .lock()
            .callbacks
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect()
    }
}

/// Reactive query handle
///
/// Cloning yields another handle to the same query.
pub struct PreparedQuery<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for PreparedQuery<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + Sync + 'static> PreparedQuery<T> {
    /// Wrap a resolver
    pub fn new(resolver: Arc<dyn Resolver<T>>) -> Self {
        let shared = Arc::new(Shared {
            resolver,
            subscribers: Mutex::new(Subscribers {
                next_id: 0,
                callbacks: Vec::new(),
                transitions: VecDeque::new(),
            }),
            lifecycle: tokio::sync::Mutex::new(()),
            running: AtomicBool::new(false),
            firing: AtomicUsize::new(0),
            pending: Mutex::new(Vec::new()),
            resolver_changes: Mutex::new(None),
        });

        let weak: Weak<Shared<T>> = Arc::downgrade(&shared);
        let subscription = shared.resolver.changes().on(move |_| {
            if let Some(shared) = weak.upgrade() {
                let query = PreparedQuery { shared };
                for callback in query.shared.callbacks() {
                    callback(&query);
                }
            }
        });
        *shared.resolver_changes.lock() = Some(subscription);

        Self { shared }
    }

    /// Current results
    ///
    /// # Errors
    ///
    /// `Error::Usage` when the query has no subscribers.
    pub fn results(&self) -> Result<Vec<T>> {
        if self.subscriber_count() == 0 && self.shared.firing.load(Ordering::Acquire) == 0 {
            return Err(Error::usage(
                "Query must have at least 1 subscriber for `.results` to be used. Use query.run() instead.",
            ));
        }
        self.shared.resolver.results_sync()
    }

    /// Load and return all results
    pub async fn run(&self) -> Result<Vec<T>> {
        self.shared.resolver.results().await
    }

    /// Load and return the first result
    ///
    /// # Errors
    ///
    /// `Error::NoResults` when the query matches nothing.
    pub async fn first(&self) -> Result<T> {
        self.run().await?.into_iter().next().ok_or(Error::NoResults)
    }

    /// Results from already loaded data, without a subscription
    pub fn run_sync(&self) -> Result<Vec<T>> {
        self.shared.resolver.results_sync()
    }

    /// Register a callback for result changes
    ///
    /// The first subscriber schedules the resolver's `start`. With
    /// `options.fire` the callback runs once before this returns, and may
    /// read [`PreparedQuery::results`].
    #[must_use = "dropping the subscription unsubscribes"]
    pub fn subscribe<F>(&self, callback: F, options: SubscribeOptions) -> QuerySubscription<T>
    where
        F: Fn(&PreparedQuery<T>) + Send + Sync + 'static,
    {
        let callback: QueryCallback<T> = Arc::new(callback);
        let (id, first) = {
            let mut subscribers = self.shared.subscribers.lock();
            let id = subscribers.next_id;
            subscribers.next_id += 1;
            subscribers.callbacks.push((id, Arc::clone(&callback)));
            let first = subscribers.callbacks.len() == 1;
            if first {
                subscribers.transitions.push_back(Transition::Start);
            }
            (id, first)
        };
        if first {
            self.schedule_transitions();
        }

        if options.fire {
            self.shared.firing.fetch_add(1, Ordering::AcqRel);
            let _firing = FiringGuard(&self.shared.firing);
            callback(self);
        }

        QuerySubscription {
            query: Some(self.clone()),
            id,
        }
    }

    /// Number of registered callbacks
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().callbacks.len()
    }

    /// True while the resolver is started
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Wait for every scheduled lifecycle transition to finish
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.shared.pending.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(target: "tidepool::query", error = %e, "lifecycle task failed");
                }
            }
        }
    }

    fn unsubscribe(&self, id: u64) {
        let last = {
            let mut subscribers = self.shared.subscribers.lock();
            let before = subscribers.callbacks.len();
            subscribers.callbacks.retain(|(entry, _)| *entry != id);
            let last = before != subscribers.callbacks.len() && subscribers.callbacks.is_empty();
            if last {
                subscribers.transitions.push_back(Transition::Stop);
            }
            last
        };
        if last {
            self.schedule_transitions();
        }
    }

    fn schedule_transitions(&self) {
        let task = Arc::clone(&self.shared).drain_transitions();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let handle = runtime.spawn(task);
                let mut pending = self.shared.pending.lock();
                pending.retain(|h| !h.is_finished());
                pending.push(handle);
            }
            Err(_) => futures::executor::block_on(task),
        }
    }
}

impl<T> fmt::Debug for PreparedQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedQuery")
            .field("subscribers", &self.shared.subscribers.lock().callbacks.len())
            .field("running", &self.shared.running.load(Ordering::Acquire))
            .finish()
    }
}

struct FiringGuard<'a>(&'a AtomicUsize);

impl Drop for FiringGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

// =============================================================================
// QuerySubscription
// =============================================================================

/// Registration of a query callback; unsubscribes when dropped
pub struct QuerySubscription<T: Send + Sync + 'static> {
    query: Option<PreparedQuery<T>>,
    id: u64,
}

impl<T: Send + Sync + 'static> QuerySubscription<T> {
    /// Unsubscribe now
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(query) = self.query.take() {
            query.unsubscribe(self.id);
        }
    }
}

impl<T: Send + Sync + 'static> Drop for QuerySubscription<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Send + Sync + 'static> fmt::Debug for QuerySubscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySubscription")
            .field("id", &self.id)
            .field("active", &self.query.is_some())
            .finish()
    }
}
