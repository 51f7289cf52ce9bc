//! In-memory transport.
//!
//! `send` hands the message straight to a paired [`Dispatcher`] and publishes
//! its reply, if any, on the receive channel before returning. There is no
//! network, no framing and no reconnection.
//!
//! ## Reference Semantics
//!
//! This transport defines the reference behavior for the transport layer:
//!
//! - Delivery is deterministic within a single process.
//! - A reply is observable by every subscriber registered before `send`.
//! - Nothing is dropped due to timing, scheduling or background IO.
//!
//! Other transports approximate this as closely as their medium allows.

use std::sync::Arc;

use crate::{
    // ---
    Dispatcher,
    EventChannel,
    Message,
    Result,
    Transport,
    TransportPtr,
};

/// In-process loopback to a [`Dispatcher`].
pub struct MemoryTransport {
    // ---
    dispatcher: Arc<Dispatcher>,
    messages: EventChannel<String>,
}

impl MemoryTransport {
    // ---
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            messages: EventChannel::new(),
        }
    }

    /// Shared-pointer constructor for use with the client.
    pub fn create(dispatcher: Arc<Dispatcher>) -> TransportPtr {
        Arc::new(Self::new(dispatcher))
    }

    /// Publish `raw` on the receive channel as if it had arrived from the
    /// peer. Returns the number of subscribers reached.
    pub fn inject(&self, raw: impl Into<String>) -> usize {
        self.messages.publish(raw.into())
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    async fn send(&self, message: &Message) -> Result<()> {
        // ---
        let text = message.encode()?;

        if let Some(reply) = self.dispatcher.handle_text(&text).await {
            let _delivered = self.messages.publish(reply);
            crate::log_debug!("memory transport delivered reply to {_delivered} subscriber(s)");
        }
        Ok(())
    }

    fn messages(&self) -> &EventChannel<String> {
        &self.messages
    }
}
