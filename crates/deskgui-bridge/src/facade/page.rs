use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use deskgui_common::{BridgeError, BridgeId};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::{self, Envelope};
use crate::config::BridgeConfig;
use crate::dispatcher::{EventDispatcher, PushEvent};
use crate::pending::{PendingCall, PendingCalls};
use crate::transport::{Inbound, Transport};

/// Page half of the bridge: issues calls to the host and receives its
/// replies and push events.
pub struct PageBridge {
    id: BridgeId,
    config: BridgeConfig,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    pending: PendingCalls,
    dispatcher: EventDispatcher,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl PageBridge {
    pub fn new(transport: Arc<dyn Transport>, config: BridgeConfig) -> Self {
        let bridge = Self {
            id: BridgeId::new(),
            pending: PendingCalls::new(config.max_pending),
            config,
            transport: Mutex::new(Some(transport)),
            dispatcher: EventDispatcher::new(),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        };
        debug!(bridge = %bridge.id, "page bridge created");
        bridge
    }

    pub fn id(&self) -> &BridgeId {
        &self.id
    }

    fn send(&self, envelope: &Envelope) -> Result<(), BridgeError> {
        let transport = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(BridgeError::TransportClosed)?;
        let frame = codec::encode(envelope);
        if self.config.log_frames {
            trace!(bridge = %self.id, frame = %frame, "page -> host");
        }
        transport.send(frame)
    }

    /// Call a host function without waiting for, or receiving, a result.
    pub fn invoke(&self, name: impl Into<String>, payload: Value) -> Result<(), BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::TransportClosed);
        }
        let envelope = self.pending.fire_and_forget(name, payload);
        self.send(&envelope).inspect_err(|e| self.on_send_failure(e))
    }

    /// Call a host function and get a future for its result.
    ///
    /// Never blocks. If the bridge is closed or the call cannot be sent,
    /// the returned future is already rejected.
    pub fn invoke_async(&self, name: impl Into<String>, payload: Value) -> PendingCall {
        let (envelope, call) = match self.pending.issue(name, payload) {
            Ok(issued) => issued,
            Err(e) => return PendingCall::rejected(e),
        };
        // Registered above, before the frame leaves.
        if let Err(e) = self.send(&envelope) {
            if let Some(id) = envelope.id() {
                self.pending.complete(id, Err(e.clone()));
            }
            self.on_send_failure(&e);
        }
        call
    }

    fn on_send_failure(&self, e: &BridgeError) {
        if e.is_global() {
            warn!(bridge = %self.id, error = %e, "transport failed; closing bridge");
            self.close();
        }
    }

    /// Install the push-event handler, replacing any previous one.
    pub fn on_event<F>(&self, f: F)
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.dispatcher.set_handler(f);
    }

    pub fn clear_event_handler(&self) {
        self.dispatcher.clear_handler();
    }

    /// Reject outstanding calls to a function the host has unbound.
    pub fn unbind(&self, name: &str) -> usize {
        self.pending
            .reject_named(name, BridgeError::HandlerFailure("function unbound".into()))
    }

    /// Decode and act on one frame from the host.
    pub fn handle_frame(&self, raw: &str) {
        if self.config.log_frames {
            trace!(bridge = %self.id, frame = %raw, "host -> page");
        }
        let envelope = match codec::decode(raw) {
            Ok(e) => e,
            Err(e) => {
                warn!(bridge = %self.id, body_len = raw.len(), error = %e, "frame rejected");
                return;
            }
        };

        match envelope {
            Envelope::Result { .. } | Envelope::Error { .. } => {
                let id = envelope.id();
                if !self.pending.settle(envelope) {
                    debug!(bridge = %self.id, call_id = ?id, "unmatched reply dropped");
                }
            }
            Envelope::Event { name, payload } => {
                self.dispatcher.dispatch(&PushEvent { name, payload });
            }
            Envelope::Call { name, .. } => {
                warn!(bridge = %self.id, name = %name, "unexpected call from host");
            }
        }
    }

    /// Deliver frames from the host in arrival order until the channel
    /// ends or the bridge is closed. Closing rejects any calls still
    /// outstanding.
    pub async fn run(&self, mut inbound: Inbound) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                frame = inbound.recv() => match frame {
                    Some(frame) => self.handle_frame(&frame),
                    None => {
                        debug!(bridge = %self.id, "host channel ended");
                        break;
                    }
                },
            }
        }
        self.close();
    }

    /// Tear down the bridge: reject every outstanding call with
    /// `TransportClosed` and release the transport. Idempotent; returns
    /// false if already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.cancel();
        let rejected = self.pending.close();
        if let Some(transport) = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            transport.close();
        }
        info!(bridge = %self.id, rejected, "page bridge closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for PageBridge {
    fn drop(&mut self) {
        self.close();
    }
}
