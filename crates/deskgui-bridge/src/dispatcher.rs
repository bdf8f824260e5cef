//! Page-side delivery of host push events.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{error, trace};

/// A host-originated message.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub name: String,
    pub payload: Value,
}

type EventHandler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

/// Holds at most one subscriber; setting a new one silently replaces it.
#[derive(Default)]
pub struct EventDispatcher {
    handler: Mutex<Option<EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_handler<F>(&self, f: F)
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        *self.handler.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(f));
    }

    pub fn clear_handler(&self) {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn has_handler(&self) -> bool {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run the current handler on `event`. Returns false if there was no
    /// handler or it panicked.
    pub fn dispatch(&self, event: &PushEvent) -> bool {
        // Cloned out so a handler may replace itself without deadlocking.
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(handler) = handler else {
            trace!(name = %event.name, "event dropped: no handler");
            return false;
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
            Ok(()) => true,
            Err(_) => {
                error!(name = %event.name, "event handler panicked");
                false
            }
        }
    }
}
