//! Host <-> page bridge for embedded web content.
//!
//! Provides:
//! - A JSON envelope codec (call / result / error / event)
//! - A host-side call registry with sync, async and callback handlers
//! - A page-side pending-call table with resolve-once futures
//! - Push events from host to page
//! - Transports: in-memory pair and script injection into a webview
//! - The JavaScript shim installed into the page

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod facade;
pub mod pending;
pub mod registry;
pub mod shim;
pub mod transport;

pub use codec::{decode, decode_args, encode, Envelope, ErrorCode};
pub use config::BridgeConfig;
pub use dispatcher::{EventDispatcher, PushEvent};
pub use facade::{HostBridge, InMemoryBridge, PageBridge};
pub use pending::{PendingCall, PendingCalls};
pub use registry::{CallRegistry, Dispatched, Handler};
pub use shim::CallShape;
pub use transport::{Inbound, InboundSender, Transport};
