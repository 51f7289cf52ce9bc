//! Transport-agnostic JSON-RPC 2.0 engine.
//!
//! The crate splits the protocol into three layers:
//!
//! - [`protocol`]: message types, error codes, id generators and structural
//!   validation of decoded JSON.
//! - [`Dispatcher`] (server side): routes requests and notifications to
//!   registered handlers, validates params and results against each
//!   method's [`MethodContract`], and produces the response.
//! - [`RpcClient`] (client side): issues calls, correlates responses by id,
//!   enforces per-call timeouts and drains pending calls on shutdown.
//!
//! Both sides talk to a [`Transport`], which only moves single JSON texts.
//! Three transports ship with the crate: [`MemoryTransport`] (in-process
//! loopback to a dispatcher), [`StreamTransport`] (newline-delimited JSON
//! over TCP, with reconnect) and, behind the `transport_http` feature,
//! [`HttpTransport`].

mod macros;
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

mod client;
mod config;
mod domain;
mod error;
mod event;
mod reconnect;
mod schema;
mod server;
mod transport;
mod transport_builder;

pub mod protocol;

// --- public re-exports
pub use client::{CallOptions, RpcClient, RpcClientBuilder};
pub use config::{
    //
    ClientConfig,
    HttpConfig,
    StreamConfig,
    DEFAULT_MAX_LINE_LENGTH,
    DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use domain::{Transport, TransportPtr};
pub use error::{Result, RpcError};
pub use event::{EventChannel, EventSubscription, SubscriberId};
pub use protocol::{
    //
    ErrorCode,
    ErrorObject,
    ErrorResponse,
    FnIds,
    IdGenerator,
    IdGeneratorPtr,
    Message,
    Notification,
    Request,
    RequestId,
    Response,
    SequentialIds,
    SuccessResponse,
    UuidIds,
};
pub use reconnect::ReconnectPolicy;
pub use schema::{
    //
    AnyValue,
    MethodContract,
    Schema,
    SchemaPtr,
    Typed,
    Violation,
    Violations,
};
pub use server::{
    //
    serve_connection,
    spawn_tcp_server,
    Dispatcher,
};
pub use transport::{
    //
    ConnectionEvent,
    ConnectionState,
    MemoryTransport,
    StreamTransport,
};
pub use transport_builder::TransportBuilder;

#[cfg(feature = "transport_http")]
pub use server::http_router;
#[cfg(feature = "transport_http")]
pub use transport::HttpTransport;
