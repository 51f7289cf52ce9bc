//! Persistent, newline-delimited stream transport over TCP.

pub(crate) mod framing;
mod transport;

pub use transport::{ConnectionEvent, ConnectionState, StreamTransport};
