//! Typed observer lists
//!
//! [`Event<T>`] is a list of listeners that receive `&T` on [`Event::emit`].
//! Registering returns a [`Subscription`]; dropping it removes the listener.
//!
//! Listeners are invoked outside the internal lock, in registration order, so
//! a listener may subscribe, unsubscribe or emit on the same event without
//! deadlocking. A listener removed during an emit may still receive that
//! emit; it will not receive later ones.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Listener callback
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifier of a registered listener, unique per event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(ListenerId, Listener<T>)>,
}

/// A list of listeners for values of type `T`
///
/// Cloning an `Event` yields another handle to the same listener list.
pub struct Event<T> {
    inner: Arc<Mutex<Listeners<T>>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("listeners", &self.inner.lock().entries.len())
            .finish()
    }
}

impl<T: 'static> Event<T> {
    /// Create an event with no listeners
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// dropped or [`Subscription::unsubscribe`] is called.
    #[must_use = "dropping the subscription removes the listener"]
    pub fn on<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
        T: Send,
    {
        let id = {
            let mut inner = self.inner.lock();
            let id = ListenerId(inner.next_id);
            inner.next_id += 1;
            inner.entries.push((id, Arc::new(listener)));
            id
        };

        let weak: Weak<Mutex<Listeners<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    /// Deliver `value` to every listener registered at the time of the call
    pub fn emit(&self, value: &T) {
        let listeners: Vec<Listener<T>> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(value);
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.lock().entries.len()
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Handle to a registration; removes it when dropped
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Wrap an arbitrary cancellation closure
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription that does nothing when dropped
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    /// Remove the registration now
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    /// True until the subscription is cancelled
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
