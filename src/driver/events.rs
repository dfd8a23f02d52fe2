use parking_lot::Mutex;
use std::sync::{Arc, Weak};

pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    listeners: Vec<(u64, Listener<E>)>,
}

/// Fan-out of driver events to registered listeners.
///
/// Listeners run synchronously on the emitting task, so anything that needs
/// to await must spawn. The registry lock is released before listeners are
/// invoked, which lets a listener drop its own [`Subscription`].
pub struct EventHub<E> {
    registry: Arc<Mutex<Registry<E>>>,
}

impl<E: 'static> EventHub<E> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    pub fn subscribe(&self, listener: Listener<E>) -> Subscription {
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.listeners.push((id, listener));
            id
        };

        let weak: Weak<Mutex<Registry<E>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                registry.lock().listeners.retain(|(lid, _)| *lid != id);
            }
        })
    }

    pub fn emit(&self, event: &E) {
        let listeners: Vec<Listener<E>> = self
            .registry
            .lock()
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

impl<E: 'static> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned when subscribing to driver events. Dropping it detaches
/// the listener.
#[must_use = "dropping a subscription detaches its listener"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A subscription that owns nothing, for drivers without the event.
    pub fn noop() -> Self {
        Self { unsubscribe: None }
    }

    pub fn detach(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
