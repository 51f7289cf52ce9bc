use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Standard error codes.
///
/// `InvalidParameters` is `-32606`, not the `-32602` of the JSON-RPC
/// document; peers of this engine rely on that value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParameters,
    InternalServerError,
    ResourceNotFound,
}

impl ErrorCode {
    // ---
    pub const fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParameters => -32606,
            ErrorCode::InternalServerError => -32603,
            ErrorCode::ResourceNotFound => -32004,
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParameters => "Invalid parameters",
            ErrorCode::InternalServerError => "Internal server error",
            ErrorCode::ResourceNotFound => "Resource not found",
        }
    }

    /// Standard code for a wire integer, if it is one.
    pub fn from_code(code: i64) -> Option<Self> {
        [
            ErrorCode::ParseError,
            ErrorCode::InvalidRequest,
            ErrorCode::MethodNotFound,
            ErrorCode::InvalidParameters,
            ErrorCode::InternalServerError,
            ErrorCode::ResourceNotFound,
        ]
        .into_iter()
        .find(|c| c.code() == code)
    }
}

/// The `error` member of an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Error object for a standard code with its canonical message.
    pub fn new(code: ErrorCode, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_string(),
            data,
        }
    }

    pub fn custom(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }
}
