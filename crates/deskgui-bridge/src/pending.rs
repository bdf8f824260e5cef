//! Page-side table of outstanding async calls.
//!
//! ```text
//!   issue()  ──► id, entry{oneshot::Sender}  ──► Call envelope (sent by caller)
//!                      │
//!   settle(Result|Error with id) ──► remove entry ──► resolve / reject once
//!                      │
//!   close()  ──► reject every entry with TransportClosed
//! ```
//!
//! An entry is inserted before its envelope is handed back, so a reply can
//! never race ahead of its registration. Dropping a `PendingCall` (a
//! caller-level timeout, say) removes its entry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use deskgui_common::{BridgeError, CallId, CallIdGenerator};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::codec::Envelope;

type Reply = Result<Value, BridgeError>;

struct PendingEntry {
    name: String,
    created_at: Instant,
    tx: oneshot::Sender<Reply>,
}

struct TableState {
    entries: HashMap<CallId, PendingEntry>,
    closed: bool,
}

pub struct PendingCalls {
    ids: CallIdGenerator,
    max_pending: usize,
    state: Arc<Mutex<TableState>>,
}

impl PendingCalls {
    pub fn new(max_pending: usize) -> Self {
        Self {
            ids: CallIdGenerator::new(),
            max_pending,
            state: Arc::new(Mutex::new(TableState {
                entries: HashMap::new(),
                closed: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new outstanding call.
    ///
    /// On success returns the envelope to transmit and the future the caller
    /// awaits. When the table is closed or full, the error is returned and
    /// nothing is registered.
    pub fn issue(
        &self,
        name: impl Into<String>,
        payload: Value,
    ) -> Result<(Envelope, PendingCall), BridgeError> {
        let name = name.into();
        let mut state = self.state();
        if state.closed {
            return Err(BridgeError::TransportClosed);
        }
        if state.entries.len() >= self.max_pending {
            debug!(
                name = %name,
                pending = state.entries.len(),
                max_pending = self.max_pending,
                "too many pending calls; refusing new call"
            );
            return Err(BridgeError::TooManyPending(self.max_pending));
        }

        let id = self.ids.next_id();
        let (tx, rx) = oneshot::channel();
        state.entries.insert(
            id,
            PendingEntry {
                name: name.clone(),
                created_at: Instant::now(),
                tx,
            },
        );
        trace!(call_id = %id, name = %name, "call issued");

        let call = PendingCall::waiting(id, rx, Arc::downgrade(&self.state));
        Ok((Envelope::call(id, name, payload), call))
    }

    /// A call that expects no reply; nothing is registered.
    pub fn fire_and_forget(&self, name: impl Into<String>, payload: Value) -> Envelope {
        Envelope::notify(name, payload)
    }

    /// Settle the call matching a result or error envelope.
    ///
    /// Returns false when no entry matches (unknown, duplicate or late
    /// reply) or the envelope is not a reply; such envelopes are dropped.
    pub fn settle(&self, envelope: Envelope) -> bool {
        let (id, outcome) = match envelope {
            Envelope::Result { id, payload } => (id, Ok(payload)),
            Envelope::Error { id, code, message } => (id, Err((code, message))),
            _ => return false,
        };
        let Some(entry) = self.take(id) else {
            return false;
        };
        let reply = outcome.map_err(|(code, message)| code.into_error(&entry.name, message));
        deliver(id, entry, reply);
        true
    }

    /// Settle one call directly, e.g. when its envelope could not be sent.
    pub fn complete(&self, id: CallId, reply: Reply) -> bool {
        match self.take(id) {
            Some(entry) => {
                deliver(id, entry, reply);
                true
            }
            None => false,
        }
    }

    fn take(&self, id: CallId) -> Option<PendingEntry> {
        let entry = self.state().entries.remove(&id);
        if entry.is_none() {
            debug!(call_id = %id, "reply for unknown call dropped");
        }
        entry
    }

    /// Reject every outstanding call with `err`. Returns how many were rejected.
    pub fn reject_all(&self, err: BridgeError) -> usize {
        let drained: Vec<_> = self.state().entries.drain().collect();
        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.tx.send(Err(err.clone()));
        }
        count
    }

    /// Reject outstanding calls to one function.
    pub fn reject_named(&self, name: &str, err: BridgeError) -> usize {
        let matching: Vec<_> = {
            let mut state = self.state();
            let ids: Vec<_> = state
                .entries
                .iter()
                .filter(|(_, e)| e.name == name)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| state.entries.remove(&id))
                .collect()
        };
        let count = matching.len();
        for entry in matching {
            let _ = entry.tx.send(Err(err.clone()));
        }
        count
    }

    /// Refuse new calls and reject outstanding ones with `TransportClosed`.
    /// Returns how many were rejected; a second close rejects nothing.
    pub fn close(&self) -> usize {
        self.state().closed = true;
        self.reject_all(BridgeError::TransportClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of outstanding calls, ascending.
    pub fn outstanding(&self) -> Vec<CallId> {
        let mut ids: Vec<_> = self.state().entries.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Age of the oldest outstanding call, for caller-level timeouts.
    pub fn oldest_age(&self) -> Option<Duration> {
        self.state()
            .entries
            .values()
            .map(|e| e.created_at.elapsed())
            .max()
    }
}

fn deliver(id: CallId, entry: PendingEntry, reply: Reply) {
    trace!(
        call_id = %id,
        name = %entry.name,
        elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
        ok = reply.is_ok(),
        "call settled"
    );
    // The caller may have dropped its future; that is not an error.
    let _ = entry.tx.send(reply);
}

enum State {
    Waiting {
        rx: oneshot::Receiver<Reply>,
        table: Weak<Mutex<TableState>>,
    },
    Ready(Option<BridgeError>),
}

/// Future for one async call. Yields exactly one outcome.
///
/// Dropping it abandons the call: its table entry is removed and a late
/// reply is dropped as unknown.
pub struct PendingCall {
    id: Option<CallId>,
    state: State,
}

impl PendingCall {
    fn waiting(id: CallId, rx: oneshot::Receiver<Reply>, table: Weak<Mutex<TableState>>) -> Self {
        Self {
            id: Some(id),
            state: State::Waiting { rx, table },
        }
    }

    /// A call that failed before it was ever issued.
    pub fn rejected(err: BridgeError) -> Self {
        Self {
            id: None,
            state: State::Ready(Some(err)),
        }
    }

    /// Correlation id, `None` if the call was rejected before issue.
    pub fn id(&self) -> Option<CallId> {
        self.id
    }
}

impl Future for PendingCall {
    type Output = Result<Value, BridgeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            State::Waiting { rx, .. } => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(reply)) => Poll::Ready(reply),
                // Sender dropped without a reply: the table went away.
                Poll::Ready(Err(_)) => Poll::Ready(Err(BridgeError::TransportClosed)),
                Poll::Pending => Poll::Pending,
            },
            State::Ready(err) => Poll::Ready(Err(err
                .take()
                .unwrap_or(BridgeError::TransportClosed))),
        }
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        let (State::Waiting { table, .. }, Some(id)) = (&self.state, self.id) else {
            return;
        };
        let Some(table) = table.upgrade() else {
            return;
        };
        let removed = table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .remove(&id);
        if let Some(entry) = removed {
            trace!(call_id = %id, name = %entry.name, "call abandoned");
        }
    }
}
