//! In-process transport: two endpoints joined by unbounded tokio channels.

use std::sync::{Arc, Mutex, PoisonError};

use deskgui_common::BridgeError;

use super::{Inbound, InboundSender, Transport};

/// Outbound half of a memory endpoint.
pub struct MemorySender {
    tx: Mutex<Option<InboundSender>>,
}

impl Transport for MemorySender {
    fn send(&self, frame: String) -> Result<(), BridgeError> {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) if tx.push(frame) => Ok(()),
            _ => Err(BridgeError::TransportClosed),
        }
    }

    fn close(&self) {
        // Dropping the sender lets the peer's inbound drain and then end.
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// One side of an in-memory channel.
pub struct MemoryEndpoint {
    pub outbound: Arc<MemorySender>,
    pub inbound: Inbound,
}

impl MemoryEndpoint {
    /// Split into the pieces a bridge facade consumes.
    pub fn split(self) -> (Arc<dyn Transport>, Inbound) {
        let outbound: Arc<dyn Transport> = self.outbound;
        (outbound, self.inbound)
    }
}

/// Create two connected endpoints; frames sent on one arrive on the other.
pub fn pair() -> (MemoryEndpoint, MemoryEndpoint) {
    let (a_tx, a_rx) = Inbound::channel();
    let (b_tx, b_rx) = Inbound::channel();
    let a = MemoryEndpoint {
        outbound: Arc::new(MemorySender {
            tx: Mutex::new(Some(b_tx)),
        }),
        inbound: a_rx,
    };
    let b = MemoryEndpoint {
        outbound: Arc::new(MemorySender {
            tx: Mutex::new(Some(a_tx)),
        }),
        inbound: b_rx,
    };
    (a, b)
}
