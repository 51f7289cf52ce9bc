use serde::{Serialize, Serializer};
use serde_json::Value;

use super::{ErrorCode, ErrorObject, RequestId};

/// Literal value of the version member on every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Version marker; always serializes as `"2.0"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Version;

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

/// An addressed call expecting exactly one response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub jsonrpc: Version,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: RequestId,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: Version,
            method: method.into(),
            params,
            id,
        }
    }
}

/// A fire-and-forget call. Never carries an `id`, never answered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub jsonrpc: Version,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Version,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessResponse {
    pub jsonrpc: Version,
    /// May be `null`; always present on the wire.
    pub result: Value,
    pub id: RequestId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub jsonrpc: Version,
    pub error: ErrorObject,
    /// `None` (serialized as `null`) only when the failure happened before
    /// the request id could be determined.
    pub id: Option<RequestId>,
}

/// A success or an error response; never both.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Success(SuccessResponse),
    Error(ErrorResponse),
}

impl Response {
    // ---
    pub fn success(result: Value, id: RequestId) -> Self {
        Response::Success(SuccessResponse {
            jsonrpc: Version,
            result,
            id,
        })
    }

    pub fn error(error: ErrorObject, id: Option<RequestId>) -> Self {
        Response::Error(ErrorResponse {
            jsonrpc: Version,
            error,
            id,
        })
    }

    /// Error response for a standard code with its canonical message.
    pub fn standard_error(code: ErrorCode, data: Option<Value>, id: Option<RequestId>) -> Self {
        Self::error(ErrorObject::new(code, data), id)
    }

    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Response::Success(ok) => Some(&ok.id),
            Response::Error(err) => err.id.as_ref(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Any single wire message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl Message {
    /// Method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(req) => Some(&req.method),
            Message::Notification(note) => Some(&note.method),
            Message::Response(_) => None,
        }
    }

    /// True for messages whose sender waits for a reply.
    pub fn expects_reply(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    /// Compact single-line JSON text of the message.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<Request> for Message {
    fn from(value: Request) -> Self {
        Message::Request(value)
    }
}

impl From<Notification> for Message {
    fn from(value: Notification) -> Self {
        Message::Notification(value)
    }
}

impl From<Response> for Message {
    fn from(value: Response) -> Self {
        Message::Response(value)
    }
}
