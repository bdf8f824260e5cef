//! Public surface of each side of the bridge.
//!
//! - [`HostBridge`]: `register`, `emit`, and the loop serving page calls.
//! - [`PageBridge`]: `invoke`, `invoke_async`, `on_event`, and the loop
//!   delivering host replies and events.

mod host;
mod page;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::transport;

pub use host::HostBridge;
pub use page::PageBridge;

/// Both halves of a bridge joined by an in-memory channel, with their
/// delivery loops running on the current tokio runtime.
pub struct InMemoryBridge {
    pub host: Arc<HostBridge>,
    pub page: Arc<PageBridge>,
    pub host_task: JoinHandle<()>,
    pub page_task: JoinHandle<()>,
}

impl InMemoryBridge {
    pub fn spawn(config: BridgeConfig) -> Self {
        let (host_end, page_end) = transport::pair();
        let (host_tx, host_rx) = host_end.split();
        let (page_tx, page_rx) = page_end.split();

        let host = HostBridge::new(host_tx, config.clone());
        let page = Arc::new(PageBridge::new(page_tx, config));

        let host_task = tokio::spawn(Arc::clone(&host).serve(host_rx));
        let page_task = {
            let page = Arc::clone(&page);
            tokio::spawn(async move { page.run(page_rx).await })
        };

        Self {
            host,
            page,
            host_task,
            page_task,
        }
    }
}
