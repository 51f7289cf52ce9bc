//! Transport implementations.
//!
//! Concrete implementations of the domain-level `Transport` trait. The
//! client and the dispatcher only ever see `TransportPtr`; nothing outside
//! this module depends on how a transport moves its bytes.

mod memory;
pub(crate) mod stream;

#[cfg(feature = "transport_http")]
mod http;

pub use memory::MemoryTransport;
pub use stream::{ConnectionEvent, ConnectionState, StreamTransport};

#[cfg(feature = "transport_http")]
pub use http::HttpTransport;
