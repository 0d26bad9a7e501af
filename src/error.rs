//! Error taxonomy shared by every layer of the runtime.
//!
//! Errors travel over the wire as codec `Value::Error` records whose `name`
//! is the kind name (`ValidationError`, `TransportError`, ...). Converting
//! back with [`RpcError::from_value`] restores the kind on the caller side.

use crate::codec::{CodecError, ErrorValue, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RpcError {
    /// Malformed target or configuration. Raised before any I/O, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Connection refused/reset. Retried with backoff, then surfaced.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success status or undecodable body. Never retried.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A service method reported failure.
    #[error("application error: {0}")]
    Application(Value),

    #[error("not found: {0}")]
    NotFound(String),

    /// Unknown gid, service or method on the receiving node.
    #[error("route error: {0}")]
    Route(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, RpcError>;

impl RpcError {
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Validation(_) => "ValidationError",
            RpcError::Transport(_) => "TransportError",
            RpcError::Protocol(_) => "ProtocolError",
            RpcError::Application(_) => "ApplicationError",
            RpcError::NotFound(_) => "NotFoundError",
            RpcError::Route(_) => "RouteError",
            RpcError::Codec(_) => "CodecError",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RpcError::NotFound(_))
    }

    /// Wire representation of this error.
    ///
    /// Application errors already carry a value and are passed through
    /// unchanged so a remote error reaches the original caller verbatim.
    pub fn to_value(&self) -> Value {
        match self {
            RpcError::Application(value) => value.clone(),
            RpcError::Validation(msg)
            | RpcError::Transport(msg)
            | RpcError::Protocol(msg)
            | RpcError::NotFound(msg)
            | RpcError::Route(msg) => Value::error(self.kind(), msg),
            RpcError::Codec(err) => Value::error(self.kind(), &err.to_string()),
        }
    }

    /// Restores a typed error from a wire value produced by [`RpcError::to_value`].
    pub fn from_value(value: Value) -> Self {
        let Value::Error(err) = &value else {
            return RpcError::Application(value);
        };
        let ErrorValue { name, message, .. } = err.as_ref();
        match name.as_str() {
            "ValidationError" => RpcError::Validation(message.clone()),
            "TransportError" => RpcError::Transport(message.clone()),
            "ProtocolError" => RpcError::Protocol(message.clone()),
            "NotFoundError" => RpcError::NotFound(message.clone()),
            "RouteError" => RpcError::Route(message.clone()),
            _ => RpcError::Application(value),
        }
    }
}
