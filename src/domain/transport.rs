// src/domain/transport.rs

//! Transport domain abstraction.
//!
//! This module defines the duplex-channel interface used by the client and
//! server layers to exchange messages. It intentionally avoids any reference
//! to concrete media (sockets, HTTP, in-process calls).
//!
//! The transport layer is responsible only for delivering messages and for
//! surfacing whatever arrives from the peer as raw text. Request/response
//! correlation, timeouts and result validation are handled by the client.
//!
//! Concrete implementations of this interface live under `src/transport/`.
use std::sync::Arc;

use crate::{EventChannel, Message, Result};

/// Transport abstraction.
///
/// A `Transport` carries single protocol messages to a peer and publishes
/// every raw message text received from that peer on its
/// [`messages`](Transport::messages) channel.
///
/// Implementations must ensure that:
/// - `send()` completes once the message is handed to the medium. Replies,
///   if any, are published on `messages()`; exchange-style transports
///   (in-process, HTTP) publish the reply before `send()` returns.
/// - Every message published on `messages()` is one complete message text.
/// - Subscribers registered before a reply is published receive it.
/// - A transport holding a persistent link announces every unexpected loss
///   of that link on [`connection_lost`](Transport::connection_lost) before
///   it tries to reconnect. Replies to messages sent over the lost link
///   never arrive.
///
/// The in-memory transport serves as the reference implementation of these
/// semantics.
///
/// # Available Implementations
///
/// - `MemoryTransport` - direct dispatch into an in-process [`Dispatcher`](crate::Dispatcher)
/// - `HttpTransport` - one HTTP exchange per message (feature `transport_http`)
/// - `StreamTransport` - newline-delimited TCP stream with reconnection
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Consumers should treat methods as normal
/// `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Deliver one message to the peer.
    async fn send(&self, message: &Message) -> Result<()>;

    /// Channel on which raw incoming message texts are published.
    fn messages(&self) -> &EventChannel<String>;

    /// Channel carrying the reason each time the link to the peer drops.
    ///
    /// `None` for transports without a persistent link.
    fn connection_lost(&self) -> Option<&EventChannel<String>> {
        None
    }

    /// Release connection resources.
    ///
    /// The default implementation does nothing, for transports that hold
    /// no persistent state.
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

/// Shared transport pointer.
///
/// This is an `Arc<dyn Transport>`, which means:
/// - `.clone()` is cheap (only increments a reference count)
/// - Multiple clones share the same underlying connection
/// - Used to erase concrete transport types behind a stable domain interface.
pub type TransportPtr = Arc<dyn Transport>;
