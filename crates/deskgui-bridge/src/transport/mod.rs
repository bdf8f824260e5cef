//! Channel transport: moves opaque text frames between host and page.
//!
//! A transport never looks inside a frame. It must keep frames of one
//! direction in order and deliver each exactly once; anything beyond that
//! (correlation, decoding, dispatch) lives in the bridge facades.

use deskgui_common::BridgeError;
use tokio::sync::mpsc;

pub mod memory;
pub mod script;

pub use memory::{pair, MemoryEndpoint, MemorySender};
pub use script::{ScriptSink, ScriptTransport};

/// Outbound half of a channel.
///
/// `send` must not block: implementations queue the frame or hand it to
/// the rendering engine and return.
pub trait Transport: Send + Sync {
    fn send(&self, frame: String) -> Result<(), BridgeError>;

    /// Release the underlying channel. Later sends fail.
    fn close(&self) {}
}

/// Inbound half of a channel: frames in arrival order.
pub struct Inbound {
    rx: mpsc::UnboundedReceiver<String>,
}

impl Inbound {
    /// Create an inbound queue fed by the returned sender, e.g. from a
    /// webview's IPC handler callback.
    pub fn channel() -> (InboundSender, Inbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        (InboundSender { tx }, Inbound { rx })
    }

    /// Next frame, or `None` once every sender is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Non-blocking poll used by callers that drive delivery from their
    /// own event loop.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

/// Feeds an `Inbound` queue. Cheap to clone.
#[derive(Clone)]
pub struct InboundSender {
    tx: mpsc::UnboundedSender<String>,
}

impl InboundSender {
    /// Push a raw frame. Returns false if the receiving side is gone.
    pub fn push(&self, frame: impl Into<String>) -> bool {
        self.tx.send(frame.into()).is_ok()
    }
}
