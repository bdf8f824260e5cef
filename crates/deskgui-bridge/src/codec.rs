//! Envelope wire format shared by both sides of the bridge.
//!
//! Every frame is one JSON object discriminated by `kind`:
//! - `call`: page -> host. `id` present for awaited calls, absent for
//!   fire-and-forget calls.
//! - `result`: host -> page. Settles the call with the same `id`.
//! - `error`: host -> page. Rejects the call with the same `id`. `code`
//!   says which failure it was; `message` is for display only.
//! - `event`: host -> page. Push message, no `id`.
//!
//! Payloads are kept as `serde_json::Value`, which stores integers as
//! `i64`/`u64`, so 64-bit values survive the trip exactly.

use deskgui_common::{BridgeError, CallId, DecodeError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The unit of exchange between host and page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Envelope {
    Call {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<CallId>,
        name: String,
        #[serde(default)]
        payload: Value,
    },
    Result {
        id: CallId,
        #[serde(default)]
        payload: Value,
    },
    Error {
        id: CallId,
        #[serde(default)]
        code: ErrorCode,
        message: String,
    },
    Event {
        name: String,
        #[serde(default)]
        payload: Value,
    },
}

/// Failure class carried by an `error` envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NoSuchFunction,
    #[default]
    HandlerFailure,
}

impl ErrorCode {
    pub fn of(err: &BridgeError) -> Self {
        match err {
            BridgeError::NoSuchFunction(_) => Self::NoSuchFunction,
            _ => Self::HandlerFailure,
        }
    }

    /// Rebuild the page-side error for a call to `name`.
    pub fn into_error(self, name: &str, message: String) -> BridgeError {
        match self {
            Self::NoSuchFunction => BridgeError::NoSuchFunction(name.to_string()),
            Self::HandlerFailure => BridgeError::HandlerFailure(message),
        }
    }
}

impl Envelope {
    /// An awaited call expecting exactly one result or error.
    pub fn call(id: CallId, name: impl Into<String>, payload: Value) -> Self {
        Self::Call {
            id: Some(id),
            name: name.into(),
            payload,
        }
    }

    /// A call the host must not answer.
    pub fn notify(name: impl Into<String>, payload: Value) -> Self {
        Self::Call {
            id: None,
            name: name.into(),
            payload,
        }
    }

    pub fn result(id: CallId, payload: Value) -> Self {
        Self::Result { id, payload }
    }

    /// A handler failure with the given description.
    pub fn error(id: CallId, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            code: ErrorCode::HandlerFailure,
            message: message.into(),
        }
    }

    /// Error envelope for a call that failed host-side with `err`.
    pub fn reject(id: CallId, err: &BridgeError) -> Self {
        Self::Error {
            id,
            code: ErrorCode::of(err),
            message: err.to_string(),
        }
    }

    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        Self::Event {
            name: name.into(),
            payload,
        }
    }

    /// Short lowercase name of the envelope kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Call { .. } => "call",
            Self::Result { .. } => "result",
            Self::Error { .. } => "error",
            Self::Event { .. } => "event",
        }
    }

    /// Correlation id, if this kind carries one.
    pub fn id(&self) -> Option<CallId> {
        match self {
            Self::Call { id, .. } => *id,
            Self::Result { id, .. } | Self::Error { id, .. } => Some(*id),
            Self::Event { .. } => None,
        }
    }

    /// Function name for calls, topic for events.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Call { name, .. } | Self::Event { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Deserialize the payload into the shape the receiver expects.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        match self {
            Self::Call { payload, .. } | Self::Result { payload, .. } | Self::Event { payload, .. } => {
                decode_args(payload.clone())
            }
            Self::Error { .. } => Err(DecodeError::Payload(
                "error envelopes carry no payload".into(),
            )),
        }
    }
}

/// Serialize an envelope to its JSON text frame.
pub fn encode(envelope: &Envelope) -> String {
    // Serializing a tree of `Value`s with string keys cannot fail.
    serde_json::to_string(envelope).unwrap_or_else(|_| "null".to_string())
}

pub fn encode_bytes(envelope: &Envelope) -> Vec<u8> {
    encode(envelope).into_bytes()
}

/// Parse one JSON text frame into an envelope.
pub fn decode(frame: &str) -> Result<Envelope, DecodeError> {
    serde_json::from_str(frame).map_err(|e| DecodeError::Malformed(e.to_string()))
}

pub fn decode_bytes(frame: &[u8]) -> Result<Envelope, DecodeError> {
    let text = std::str::from_utf8(frame).map_err(|_| DecodeError::InvalidUtf8)?;
    decode(text)
}

/// Interpret a payload as a declared argument or result type.
pub fn decode_args<T: DeserializeOwned>(payload: Value) -> Result<T, DecodeError> {
    serde_json::from_value(payload).map_err(|e| DecodeError::Payload(e.to_string()))
}
