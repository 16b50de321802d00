//! Listener registration and event fan-out
//!
//! Engines keep a `ListenerRegistry` and call [`ListenerRegistry::dispatch`]
//! for every lifecycle event. Handlers are cloned out of the registry before
//! they run, so a handler may register or unregister listeners itself.

use crate::track::PlayerEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

/// Engine event callback
pub type EventHandler = Arc<dyn Fn(PlayerEvent) + Send + Sync>;

/// Registration token returned by [`ListenerRegistry::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Set of registered event handlers
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<ListenerId, EventHandler>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler
    pub fn register(&self, handler: EventHandler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handler);
        trace!("Registered {}", id);
        id
    }

    /// Remove a handler; idempotent
    pub fn unregister(&self, id: ListenerId) -> bool {
        let removed = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        if removed {
            trace!("Unregistered {}", id);
        }
        removed
    }

    /// Deliver `event` to every registered handler
    pub fn dispatch(&self, event: PlayerEvent) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for handler in handlers {
            handler(event.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
