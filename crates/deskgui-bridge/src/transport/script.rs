//! Host-to-page transport by script injection.
//!
//! The rendering engine only has to evaluate JavaScript; each frame is
//! wrapped in a call to the page's `_receive`. Page-to-host frames arrive
//! through the engine's message-post callback and are fed to an
//! [`Inbound`](super::Inbound) queue by the embedder.

use std::sync::atomic::{AtomicBool, Ordering};

use deskgui_common::BridgeError;
use tracing::warn;

use super::Transport;
use crate::shim::deliver_script;

/// Anything that can run script inside the page.
///
/// Engines whose handles are tied to the UI thread implement this by
/// posting the script to that thread.
pub trait ScriptSink: Send + Sync {
    fn evaluate_script(&self, js: &str) -> Result<(), String>;
}

pub struct ScriptTransport<S> {
    sink: S,
    object: String,
    closed: AtomicBool,
}

impl<S: ScriptSink> ScriptTransport<S> {
    pub fn new(sink: S, object: impl Into<String>) -> Self {
        Self {
            sink,
            object: object.into(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: ScriptSink> Transport for ScriptTransport<S> {
    fn send(&self, frame: String) -> Result<(), BridgeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BridgeError::TransportClosed);
        }
        self.sink
            .evaluate_script(&deliver_script(&self.object, &frame))
            .map_err(|e| {
                warn!(object = %self.object, error = %e, "script injection failed");
                BridgeError::Transport(e)
            })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        scripts: Mutex<Vec<String>>,
        fail: bool,
    }

    impl ScriptSink for Recorder {
        fn evaluate_script(&self, js: &str) -> Result<(), String> {
            if self.fail {
                return Err("webview gone".into());
            }
            self.scripts.lock().unwrap().push(js.to_string());
            Ok(())
        }
    }

    #[test]
    fn wraps_frames_in_receive_calls() {
        let t = ScriptTransport::new(Recorder::default(), "webview");
        t.send(r#"{"kind":"event","name":"onMessage","payload":"hi"}"#.into())
            .unwrap();

        let scripts = t.sink().scripts.lock().unwrap();
        assert_eq!(scripts.len(), 1);
        assert!(scripts[0].starts_with(r#"window["webview"]._receive("#));
    }

    #[test]
    fn sink_failure_is_a_transport_error() {
        let t = ScriptTransport::new(
            Recorder {
                fail: true,
                ..Default::default()
            },
            "webview",
        );
        assert_eq!(
            t.send("{}".into()),
            Err(BridgeError::Transport("webview gone".into()))
        );
    }

    #[test]
    fn send_after_close_fails() {
        let t = ScriptTransport::new(Recorder::default(), "webview");
        t.close();
        assert_eq!(t.send("{}".into()), Err(BridgeError::TransportClosed));
        assert!(t.sink().scripts.lock().unwrap().is_empty());
    }
}
