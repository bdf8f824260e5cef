use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use deskgui_common::{BridgeError, BridgeEvent, BridgeId, EventBus, HandlerError};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::{self, Envelope};
use crate::config::BridgeConfig;
use crate::registry::{CallRegistry, Dispatched};
use crate::shim;
use crate::transport::{Inbound, Transport};

/// Host half of the bridge: owns the call registry and the outbound
/// channel to the page.
pub struct HostBridge {
    id: BridgeId,
    config: BridgeConfig,
    registry: CallRegistry,
    /// Single writer: every outbound frame goes through this lock.
    writer: Mutex<Option<Arc<dyn Transport>>>,
    events: EventBus,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl HostBridge {
    pub fn new(transport: Arc<dyn Transport>, config: BridgeConfig) -> Arc<Self> {
        let bridge = Self {
            id: BridgeId::new(),
            events: EventBus::new(config.event_capacity),
            config,
            registry: CallRegistry::new(),
            writer: Mutex::new(Some(transport)),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        };
        debug!(bridge = %bridge.id, "host bridge created");
        Arc::new(bridge)
    }

    pub fn id(&self) -> &BridgeId {
        &self.id
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.registry
    }

    /// Subscribe to lifecycle notifications.
    pub fn events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }

    pub fn register<F>(&self, name: impl Into<String>, f: F) -> bool
    where
        F: Fn(Value) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        self.registry.register(name, f)
    }

    pub fn register_async<F, Fut>(&self, name: impl Into<String>, f: F) -> bool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.registry.register_async(name, f)
    }

    pub fn register_callback<F>(&self, name: impl Into<String>, f: F) -> bool
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.registry.register_callback(name, f)
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.registry.unregister(name)
    }

    /// Script to inject on page load: the bridge object plus a stub for
    /// every registered function.
    pub fn bootstrap_script(&self) -> String {
        let object = &self.config.object_name;
        let mut script = shim::init_script(object);
        for (name, shape) in self.registry.shapes() {
            script.push('\n');
            script.push_str(&shim::bind_script(object, &name, shape));
        }
        script
    }

    /// Script removing a function's stub from the page after `unregister`.
    pub fn unbind_script(&self, name: &str) -> String {
        shim::unbind_script(&self.config.object_name, name)
    }

    /// Push an event to the page. No acknowledgment.
    pub fn emit(&self, name: impl Into<String>, payload: Value) -> Result<(), BridgeError> {
        let name = name.into();
        self.write(&Envelope::event(name.clone(), payload))?;
        self.events.publish(BridgeEvent::EventEmitted { name });
        Ok(())
    }

    fn write(&self, envelope: &Envelope) -> Result<(), BridgeError> {
        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let transport = writer.as_ref().ok_or(BridgeError::TransportClosed)?;
        let frame = codec::encode(envelope);
        if self.config.log_frames {
            trace!(bridge = %self.id, frame = %frame, "host -> page");
        }
        transport.send(frame)
    }

    /// Decode and act on one frame from the page.
    ///
    /// Sync handlers and callbacks run here, so calls run in the order
    /// their frames arrive. Async handlers are spawned so a slow one never
    /// holds up the frames behind it; the returned handle completes once
    /// its reply (if any) has been written.
    pub fn handle_frame(self: &Arc<Self>, raw: &str) -> Option<JoinHandle<()>> {
        if self.config.log_frames {
            trace!(bridge = %self.id, frame = %raw, "page -> host");
        }
        let envelope = match codec::decode(raw) {
            Ok(e) => e,
            Err(e) => {
                warn!(bridge = %self.id, body_len = raw.len(), error = %e, "frame rejected");
                self.events.publish(BridgeEvent::DecodeFailed {
                    reason: e.to_string(),
                });
                return None;
            }
        };

        let Envelope::Call { id, ref name, .. } = envelope else {
            warn!(bridge = %self.id, kind = envelope.kind(), "unexpected envelope from page");
            return None;
        };
        let name = name.clone();
        self.events.publish(BridgeEvent::CallReceived {
            id,
            name: name.clone(),
        });

        match self.registry.start(envelope) {
            Dispatched::Ready(reply) => {
                self.finish(&name, reply);
                None
            }
            Dispatched::Running(fut) => {
                let bridge = Arc::clone(self);
                Some(tokio::spawn(async move {
                    let reply = fut.await;
                    bridge.finish(&name, reply);
                }))
            }
        }
    }

    fn finish(&self, name: &str, reply: Option<Envelope>) {
        let Some(reply) = reply else {
            return;
        };
        if let Some(id) = reply.id() {
            self.events.publish(BridgeEvent::CallCompleted {
                id,
                name: name.to_string(),
                ok: matches!(reply, Envelope::Result { .. }),
            });
        }
        match self.write(&reply) {
            Ok(()) => {}
            Err(e) if e.is_global() && !self.is_closed() => {
                warn!(bridge = %self.id, name, error = %e, "reply write failed; closing bridge");
                self.close();
            }
            Err(e) => {
                debug!(bridge = %self.id, name, error = %e, "reply not delivered");
            }
        }
    }

    /// Process frames from the page until the channel ends or the bridge
    /// is closed, then close the bridge.
    pub async fn serve(self: Arc<Self>, mut inbound: Inbound) {
        info!(bridge = %self.id, "host bridge serving");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                frame = inbound.recv() => match frame {
                    Some(frame) => {
                        let _ = self.handle_frame(&frame);
                    }
                    None => {
                        debug!(bridge = %self.id, "page channel ended");
                        break;
                    }
                },
            }
        }
        self.close();
    }

    /// Tear down the bridge. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.cancel();
        if let Some(transport) = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            transport.close();
        }
        self.events.publish(BridgeEvent::Closed);
        info!(bridge = %self.id, "host bridge closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for HostBridge {
    fn drop(&mut self) {
        self.close();
    }
}
