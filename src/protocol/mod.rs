//! JSON-RPC 2.0 wire model.
//!
//! This module defines the four wire shapes (request, notification, success
//! response, error response), the standard error codes, request id
//! generation, and the structural validators that turn a decoded JSON value
//! into one of the typed messages.
mod error_code;
mod id;
mod message;
mod validate;

pub use error_code::{ErrorCode, ErrorObject};
pub use id::{FnIds, IdGenerator, IdGeneratorPtr, RequestId, SequentialIds, UuidIds};
pub use message::{
    ErrorResponse, Message, Notification, Request, Response, SuccessResponse, Version,
    JSONRPC_VERSION,
};
pub use validate::{extract_id, parse_as_notification, parse_as_request, parse_as_response};
