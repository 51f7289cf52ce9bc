use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

use crate::protocol::{ErrorCode, ErrorObject, RequestId};
use crate::schema::Violations;

/// Errors produced anywhere in the RPC engine.
///
/// The same type is used on both sides of the wire. On the server side a
/// handler returns it and [`RpcError::to_error_object`] turns it into the
/// `error` member of an error response. On the client side every failed
/// call resolves to one of these variants.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Sending failed at the transport level.
    #[error("transport error: {0}")]
    Transport(String),

    /// The underlying connection dropped while a message awaited its reply.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The stream transport has no live connection at the moment.
    #[error("transport is not connected")]
    NotConnected,

    /// The stream transport gave up reconnecting.
    #[error("maximum reconnect attempts ({0}) reached")]
    MaxReconnectAttempts(u32),

    /// The payload was not valid JSON.
    #[error("parse error: {0}")]
    Decode(String),

    /// The payload was valid JSON but not a valid protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(Violations),

    /// No handler is registered under the method name.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Parameters failed the method's params schema.
    #[error("invalid parameters for '{method}': {violations}")]
    InvalidParams {
        method: String,
        violations: Violations,
    },

    /// A response arrived but its result failed the method's result schema.
    #[error("invalid result shape for '{method}' (request {id}): {violations}")]
    InvalidResult {
        method: String,
        id: RequestId,
        violations: Violations,
    },

    /// A handler could not find the entity it was asked about.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// Domain error raised by application code; code, message and data
    /// travel over the wire unchanged.
    #[error("server error {code}: {message}")]
    Server {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// Opaque failure inside the engine or a handler.
    #[error("internal error: {0}")]
    Internal(String),

    /// The remote side answered with an error response.
    #[error("remote error {code} (request {id}): {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
        id: RequestId,
    },

    /// No response arrived within the call's timeout.
    #[error("request {id} timed out after {elapsed:?}")]
    Timeout { id: RequestId, elapsed: Duration },

    /// The client is shutting down and no longer accepts or awaits calls.
    #[error("client is shutting down")]
    ShuttingDown,

    /// An outgoing message cannot be framed as a single line.
    #[error("framing error: {0}")]
    Framing(String),

    /// A handler is already registered under the method name.
    #[error("method already registered: {0}")]
    DuplicateMethod(String),

    /// A required configuration value was not provided.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;

impl RpcError {
    // ---
    /// Raise a custom server error with an application-defined code.
    pub fn server(code: i64, message: impl Into<String>) -> Self {
        RpcError::Server {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Raise a custom server error carrying additional data.
    pub fn server_with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        RpcError::Server {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Wire code associated with this error, if it has one.
    ///
    /// Errors that never cross the wire as themselves (timeouts, shutdown,
    /// local transport failures) map to the internal server error code,
    /// matching [`to_error_object`](Self::to_error_object).
    pub fn code(&self) -> i64 {
        match self {
            RpcError::Decode(_) => ErrorCode::ParseError.code(),
            RpcError::InvalidMessage(_) => ErrorCode::InvalidRequest.code(),
            RpcError::MethodNotFound(_) => ErrorCode::MethodNotFound.code(),
            RpcError::InvalidParams { .. } => ErrorCode::InvalidParameters.code(),
            RpcError::ResourceNotFound(_) => ErrorCode::ResourceNotFound.code(),
            RpcError::Server { code, .. } | RpcError::Remote { code, .. } => *code,
            _ => ErrorCode::InternalServerError.code(),
        }
    }

    /// Map this error onto the wire error object.
    ///
    /// Taxonomy errors keep their own code. Everything else is reported as
    /// an internal server error carrying the error's message.
    pub fn to_error_object(&self) -> ErrorObject {
        match self {
            RpcError::Decode(detail) => ErrorObject::new(ErrorCode::ParseError, Some(json!(detail))),
            RpcError::InvalidMessage(violations) => {
                ErrorObject::new(ErrorCode::InvalidRequest, Some(violations.to_value()))
            }
            RpcError::MethodNotFound(method) => ErrorObject::custom(
                ErrorCode::MethodNotFound.code(),
                format!("{}: {method}", ErrorCode::MethodNotFound.message()),
                Some(json!({ "method": method })),
            ),
            RpcError::InvalidParams { method, violations } => ErrorObject::custom(
                ErrorCode::InvalidParameters.code(),
                format!(
                    "{} for '{method}': {violations}",
                    ErrorCode::InvalidParameters.message()
                ),
                Some(violations.to_value()),
            ),
            RpcError::ResourceNotFound(what) => ErrorObject::custom(
                ErrorCode::ResourceNotFound.code(),
                format!("{}: {what}", ErrorCode::ResourceNotFound.message()),
                None,
            ),
            RpcError::Server {
                code,
                message,
                data,
            }
            | RpcError::Remote {
                code,
                message,
                data,
                ..
            } => ErrorObject::custom(*code, message.clone(), data.clone()),
            other => {
                let message = other.to_string();
                let message = if message.is_empty() {
                    ErrorCode::InternalServerError.message().to_string()
                } else {
                    message
                };
                ErrorObject::custom(ErrorCode::InternalServerError.code(), message, None)
            }
        }
    }

    /// Build the client-side error for a wire error response.
    pub fn from_wire(error: ErrorObject, id: RequestId) -> Self {
        RpcError::Remote {
            code: error.code,
            message: error.message,
            data: error.data,
            id,
        }
    }

    /// True if the error (local or remote) means the method is unknown.
    pub fn is_method_not_found(&self) -> bool {
        self.code() == ErrorCode::MethodNotFound.code()
    }

    /// True for [`RpcError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }
}
