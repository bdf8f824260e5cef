pub mod errors;
pub mod events;
pub mod id;

pub use errors::{BridgeError, ConfigError, DecodeError, HandlerError};
pub use events::{BridgeEvent, EventBus};
pub use id::{BridgeId, CallId, CallIdGenerator};

pub type Result<T> = std::result::Result<T, BridgeError>;
