use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::id::CallId;

/// Lifecycle notifications published by a bridge.
///
/// Purely observational: nothing in the bridge waits on subscribers, and a
/// bus with no subscribers drops events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum BridgeEvent {
    /// A call envelope arrived. `id` is `None` for fire-and-forget calls.
    CallReceived { id: Option<CallId>, name: String },
    /// A call finished; `ok` is false when an error envelope was produced.
    CallCompleted { id: CallId, name: String, ok: bool },
    /// An inbound frame could not be decoded and was dropped.
    DecodeFailed { reason: String },
    /// A push event was sent to the page.
    EventEmitted { name: String },
    /// The bridge was torn down.
    Closed,
}

pub struct EventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: BridgeEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}
