//! Synchronous publish/subscribe bus shared by the host and its plugins.
//!
//! Listeners are keyed by event type; a listener registered for
//! [`events::WILDCARD`] receives every event. Delivery happens on the
//! emitter's thread, in registration order, against a snapshot of the
//! listener list taken when `emit` starts.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use keyscope_types::{PluginEvent, Toast, events};
use serde::Serialize;
use tracing::{debug, error, trace};

type Handler = Arc<dyn Fn(&PluginEvent) + Send + Sync>;

struct Listener {
    id: u64,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<String, Vec<Listener>>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Event bus handle. Cloning shares the same listener registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = lock(&self.registry);
        let count: usize = registry.listeners.values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("listeners", &count)
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_type` (or [`events::WILDCARD`]).
    pub fn on<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&PluginEvent) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .listeners
            .entry(event_type.to_string())
            .or_default()
            .push(Listener {
                id,
                handler: Arc::new(handler),
            });
        trace!("Listener {id} registered for {event_type}");

        Subscription {
            registry: Arc::downgrade(&self.registry),
            event_type: event_type.to_string(),
            id,
        }
    }

    /// Deliver `event` to its type's listeners and to wildcard listeners.
    /// A panicking listener is logged and skipped. Returns how many listeners
    /// were called.
    pub fn emit(&self, event: &PluginEvent) -> usize {
        let snapshot = self.snapshot(&event.event_type);
        debug!(
            "Emitting {} from {} to {} listener(s)",
            event.event_type,
            event.source,
            snapshot.len()
        );

        for (id, handler) in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!(
                    "Listener {id} panicked while handling {} from {}",
                    event.event_type, event.source
                );
            }
        }
        snapshot.len()
    }

    /// Emit an event with a typed payload. Payloads that fail to serialize
    /// are logged and dropped.
    pub fn publish<T: Serialize>(&self, event_type: &str, payload: &T, source: &str) -> usize {
        match PluginEvent::typed(event_type, payload, source) {
            Ok(event) => self.emit(&event),
            Err(e) => {
                error!("Failed to serialize {event_type} payload from {source}: {e}");
                0
            }
        }
    }

    /// Emit a `toast:show` event.
    pub fn toast(&self, source: &str, toast: &Toast) -> usize {
        self.publish(events::TOAST_SHOW, toast, source)
    }

    /// Listeners registered for exactly `event_type` (wildcards not counted).
    #[must_use]
    pub fn listener_count(&self, event_type: &str) -> usize {
        lock(&self.registry)
            .listeners
            .get(event_type)
            .map_or(0, Vec::len)
    }

    fn snapshot(&self, event_type: &str) -> Vec<(u64, Handler)> {
        let registry = lock(&self.registry);
        let typed = registry.listeners.get(event_type).into_iter().flatten();
        let wildcard = if event_type == events::WILDCARD {
            None
        } else {
            registry.listeners.get(events::WILDCARD)
        };

        let mut handlers: Vec<(u64, Handler)> = typed
            .chain(wildcard.into_iter().flatten())
            .map(|l| (l.id, Arc::clone(&l.handler)))
            .collect();
        // ids grow monotonically, so sorting restores registration order
        handlers.sort_by_key(|(id, _)| *id);
        handlers
    }
}

/// Handle returned by [`EventBus::on`]. Dropping it keeps the listener
/// registered; call [`unsubscribe`](Self::unsubscribe) to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    event_type: String,
    id: u64,
}

impl Subscription {
    /// Remove exactly this listener. Returns `false` if it was already gone
    /// or the bus no longer exists.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = lock(&registry);
        let Some(list) = registry.listeners.get_mut(&self.event_type) else {
            return false;
        };

        let before = list.len();
        list.retain(|l| l.id != self.id);
        let removed = list.len() != before;
        if list.is_empty() {
            registry.listeners.remove(&self.event_type);
        }
        if removed {
            trace!("Listener {} removed from {}", self.id, self.event_type);
        }
        removed
    }

    /// Whether the listener is still registered on a live bus.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry.upgrade().is_some_and(|registry| {
            lock(&registry)
                .listeners
                .get(&self.event_type)
                .is_some_and(|list| list.iter().any(|l| l.id == self.id))
        })
    }

    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }
}
