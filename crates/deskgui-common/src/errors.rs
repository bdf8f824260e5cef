use std::path::PathBuf;

/// A frame that could not be turned into an envelope, or a payload that did
/// not match the shape the receiver asked for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("payload shape mismatch: {0}")]
    Payload(String),
}

/// Failure reported by a registered handler.
///
/// Only the description crosses the bridge; the page sees it as the
/// rejection reason of its pending call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }
}

impl From<DecodeError> for HandlerError {
    fn from(e: DecodeError) -> Self {
        Self(e.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Every way a bridge operation can fail.
///
/// Failures scoped to one call (`NoSuchFunction`, `HandlerFailure`) never
/// affect other calls; `TransportClosed` is the only global outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("no such function: {0}")]
    NoSuchFunction(String),

    #[error("{0}")]
    HandlerFailure(String),

    #[error("bridge closed")]
    TransportClosed,

    #[error("too many pending calls (limit {0})")]
    TooManyPending(usize),

    #[error("transport error: {0}")]
    Transport(String),
}

impl BridgeError {
    /// Whether this failure tears down the whole bridge rather than one call.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::TransportClosed | Self::Transport(_))
    }
}

impl From<HandlerError> for BridgeError {
    fn from(e: HandlerError) -> Self {
        Self::HandlerFailure(e.0)
    }
}
