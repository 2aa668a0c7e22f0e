//! Typed publish/subscribe bus.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Listener<P> = Arc<dyn Fn(&P) + Send + Sync>;

struct BusInner<E, P> {
    listeners: HashMap<E, Vec<(u64, Listener<P>)>>,
    next_id: u64,
}

/// Generic event bus keyed by an event enum `E` with payload `P`.
///
/// Listeners for one event type run synchronously in registration
/// order. No ordering is guaranteed across event types.
pub struct EventBus<E, P> {
    inner: Arc<Mutex<BusInner<E, P>>>,
}

impl<E, P> EventBus<E, P>
where
    E: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                listeners: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// Register a listener for one event type.
    ///
    /// The returned handle removes exactly this registration; dropping
    /// the handle disposes it too, so callers must hold on to it for
    /// as long as they want to receive events.
    pub fn add_listener<F>(&self, event: E, listener: F) -> ListenerHandle<E, P>
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        let id = {
            let mut inner = match self.inner.lock() {
                Ok(inner) => inner,
                Err(poisoned) => poisoned.into_inner(),
            };
            let id = inner.next_id;
            inner.next_id += 1;
            inner
                .listeners
                .entry(event.clone())
                .or_default()
                .push((id, Arc::new(listener)));
            id
        };

        ListenerHandle {
            inner: Arc::downgrade(&self.inner),
            event,
            id,
            disposed: AtomicBool::new(false),
        }
    }

    /// Invoke all listeners registered for `event`.
    ///
    /// The listener list is snapshotted before invocation so a listener
    /// may register or dispose listeners without deadlocking the bus.
    pub fn trigger(&self, event: &E, payload: &P) {
        let snapshot: Vec<Listener<P>> = {
            let inner = match self.inner.lock() {
                Ok(inner) => inner,
                Err(poisoned) => poisoned.into_inner(),
            };
            inner
                .listeners
                .get(event)
                .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default()
        };

        for listener in snapshot {
            listener(payload);
        }
    }

    /// Number of listeners currently registered for `event`.
    pub fn listener_count(&self, event: &E) -> usize {
        let inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.listeners.get(event).map_or(0, Vec::len)
    }
}

impl<E, P> Default for EventBus<E, P>
where
    E: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes one listener registration when disposed or dropped.
pub struct ListenerHandle<E: Eq + Hash, P> {
    inner: Weak<Mutex<BusInner<E, P>>>,
    event: E,
    id: u64,
    disposed: AtomicBool,
}

impl<E, P> ListenerHandle<E, P>
where
    E: Eq + Hash,
{
    /// Remove the registration this handle was returned for.
    /// Calling it more than once is a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = match inner.lock() {
                Ok(inner) => inner,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(list) = inner.listeners.get_mut(&self.event) {
                list.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

impl<E: Eq + Hash, P> Drop for ListenerHandle<E, P> {
    fn drop(&mut self) {
        self.dispose();
    }
}
