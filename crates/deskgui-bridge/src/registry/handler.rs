use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use deskgui_common::{BridgeError, HandlerError};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;

use crate::shim::CallShape;

pub type SyncFn = dyn Fn(Value) -> Result<Value, HandlerError> + Send + Sync;
pub type AsyncFn = dyn Fn(Value) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync;
pub type CallbackFn = dyn Fn(Value) + Send + Sync;

/// A native function reachable from the page.
#[derive(Clone)]
pub enum Handler {
    /// Returns its result immediately.
    Sync(Arc<SyncFn>),
    /// Completes later; runs without holding up other calls.
    Async(Arc<AsyncFn>),
    /// Void callback. Awaited calls to it resolve with `null`.
    Callback(Arc<CallbackFn>),
}

impl Handler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        Self::Async(Arc::new(move |payload| f(payload).boxed()))
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(f))
    }

    /// Stub shape the page should get for this handler.
    pub fn shape(&self) -> CallShape {
        match self {
            Self::Callback(_) => CallShape::FireAndForget,
            Self::Sync(_) | Self::Async(_) => CallShape::Awaited,
        }
    }

    /// Start the handler.
    ///
    /// Sync handlers and callbacks run to completion on the calling thread;
    /// async handlers come back as a future for the caller to drive.
    /// Failures and panics become `HandlerFailure`.
    pub fn start(&self, payload: Value) -> Started {
        match self {
            Self::Sync(f) => Started::Done(
                std::panic::catch_unwind(AssertUnwindSafe(|| f(payload)))
                    .map_err(panic_message)
                    .and_then(|outcome| outcome.map_err(BridgeError::from)),
            ),
            Self::Callback(f) => Started::Done(
                std::panic::catch_unwind(AssertUnwindSafe(|| f(payload)))
                    .map(|()| Value::Null)
                    .map_err(panic_message),
            ),
            Self::Async(f) => match std::panic::catch_unwind(AssertUnwindSafe(|| f(payload))) {
                Ok(fut) => Started::Running(
                    async move {
                        match AssertUnwindSafe(fut).catch_unwind().await {
                            Ok(outcome) => outcome.map_err(BridgeError::from),
                            Err(panic) => Err(panic_message(panic)),
                        }
                    }
                    .boxed(),
                ),
                Err(panic) => Started::Done(Err(panic_message(panic))),
            },
        }
    }

    /// Run the handler to completion.
    pub async fn call(&self, payload: Value) -> Result<Value, BridgeError> {
        match self.start(payload) {
            Started::Done(outcome) => outcome,
            Started::Running(fut) => fut.await,
        }
    }
}

/// Outcome of [`Handler::start`].
pub enum Started {
    Done(Result<Value, BridgeError>),
    Running(BoxFuture<'static, Result<Value, BridgeError>>),
}

fn panic_message(panic: Box<dyn Any + Send>) -> BridgeError {
    let detail = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    BridgeError::HandlerFailure(format!("handler panicked: {detail}"))
}
