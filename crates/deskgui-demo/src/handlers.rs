//! Host-side functions the demo page calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use deskgui_bridge::{decode_args, HostBridge};
use deskgui_common::HandlerError;
use serde_json::{json, Value};

/// Counter mirrored from the page's hit count.
#[derive(Default)]
pub struct Counter {
    hits: AtomicU64,
}

impl Counter {
    pub fn get(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }

    fn set(&self, value: u64) {
        self.hits.store(value, Ordering::SeqCst);
    }
}

/// Milliseconds since the Unix epoch as a decimal string, so the page
/// gets the exact value regardless of its number precision.
pub fn timestamp_millis() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

/// Register `counter_value`, `counter_reset` and `get_timestamp`.
pub fn install(host: &HostBridge, counter: Arc<Counter>) {
    {
        let counter = Arc::clone(&counter);
        host.register_callback("counter_value", move |payload: Value| {
            match decode_args::<u64>(payload) {
                Ok(hits) => {
                    counter.set(hits);
                    tracing::info!(hits, "counter updated");
                }
                Err(e) => tracing::warn!(error = %e, "counter_value: bad payload"),
            }
        });
    }

    host.register_callback("counter_reset", move |_| {
        counter.set(0);
        tracing::info!("counter reset");
    });

    host.register_async("get_timestamp", |_| async {
        Ok::<_, HandlerError>(json!(timestamp_millis()))
    });
}
