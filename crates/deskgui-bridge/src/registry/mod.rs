//! Host-side call registry: function name -> native handler.
//!
//! Lookups are presence-checked; an unknown name becomes a
//! `NoSuchFunction` error envelope rather than a fault. Handler failures,
//! including panics, are caught at the dispatch boundary.

mod handler;


use std::collections::HashMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock};

use deskgui_common::{BridgeError, CallId, HandlerError};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::codec::Envelope;
use crate::shim::CallShape;

pub use handler::{Handler, Started};

/// A call envelope the registry has started.
pub enum Dispatched {
    /// Handled on the calling thread; carries the reply, if one is owed.
    Ready(Option<Envelope>),
    /// An async handler still running; resolves to the reply, if one is owed.
    Running(BoxFuture<'static, Option<Envelope>>),
}

#[derive(Default)]
pub struct CallRegistry {
    handlers: RwLock<HashMap<String, Handler>>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `handler`. Re-registering replaces the previous
    /// handler; returns true when that happened.
    pub fn insert(&self, name: impl Into<String>, handler: Handler) -> bool {
        let name = name.into();
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = handlers.insert(name.clone(), handler).is_some();
        if replaced {
            warn!(name = %name, "handler replaced");
        } else {
            debug!(name = %name, "handler registered");
        }
        replaced
    }

    pub fn register<F>(&self, name: impl Into<String>, f: F) -> bool
    where
        F: Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.insert(name, Handler::sync(f))
    }

    pub fn register_async<F, Fut>(&self, name: impl Into<String>, f: F) -> bool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.insert(name, Handler::future(f))
    }

    pub fn register_callback<F>(&self, name: impl Into<String>, f: F) -> bool
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.insert(name, Handler::callback(f))
    }

    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            debug!(name, "handler unregistered");
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Registered names with their page-side stub shape, sorted by name.
    pub fn shapes(&self) -> Vec<(String, CallShape)> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = handlers
            .iter()
            .map(|(name, h)| (name.clone(), h.shape()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn names(&self) -> Vec<String> {
        self.shapes().into_iter().map(|(name, _)| name).collect()
    }

    /// Run the handler bound to `name`.
    pub async fn invoke(&self, name: &str, payload: Value) -> Result<Value, BridgeError> {
        // Cloned out so the lock is not held while the handler runs.
        let handler = self
            .get(name)
            .ok_or_else(|| BridgeError::NoSuchFunction(name.to_string()))?;
        handler.call(payload).await
    }

    /// Start a call envelope.
    ///
    /// Unknown names, sync handlers and callbacks finish before this
    /// returns, so calls started in arrival order also run in that order.
    /// Only async handlers are deferred.
    pub fn start(&self, envelope: Envelope) -> Dispatched {
        let kind = envelope.kind();
        let Envelope::Call { id, name, payload } = envelope else {
            warn!(kind, "registry asked to dispatch a non-call envelope");
            return Dispatched::Ready(None);
        };

        let Some(handler) = self.get(&name) else {
            let err = BridgeError::NoSuchFunction(name.clone());
            return Dispatched::Ready(reply_for(id, &name, Err(err)));
        };
        match handler.start(payload) {
            Started::Done(outcome) => Dispatched::Ready(reply_for(id, &name, outcome)),
            Started::Running(fut) => {
                Dispatched::Running(async move { reply_for(id, &name, fut.await) }.boxed())
            }
        }
    }

    /// Execute a call envelope and build the reply.
    ///
    /// Returns `None` for fire-and-forget calls and for envelopes that are
    /// not calls; otherwise exactly one result or error carrying the
    /// call's id.
    pub async fn dispatch(&self, envelope: Envelope) -> Option<Envelope> {
        match self.start(envelope) {
            Dispatched::Ready(reply) => reply,
            Dispatched::Running(fut) => fut.await,
        }
    }
}

fn reply_for(id: Option<CallId>, name: &str, outcome: Result<Value, BridgeError>) -> Option<Envelope> {
    match (id, outcome) {
        (Some(id), Ok(value)) => Some(Envelope::result(id, value)),
        (Some(id), Err(e)) => {
            debug!(call_id = %id, name = %name, error = %e, "call failed");
            Some(Envelope::reject(id, &e))
        }
        (None, Ok(_)) => None,
        (None, Err(e)) => {
            warn!(name = %name, error = %e, "fire-and-forget call failed");
            None
        }
    }
}
