//! Transport builder for creating transport instances.
//!
//! Picks the concrete transport from the URI scheme:
//!
//! | URI | Transport |
//! |---|---|
//! | `memory://` | [`MemoryTransport`] (needs [`dispatcher`](TransportBuilder::dispatcher)) |
//! | `tcp://host:port` | [`StreamTransport`] |
//! | `http://…`, `https://…` | `HttpTransport` (feature `transport_http`) |

use std::sync::Arc;
use std::time::Duration;

use crate::{
    // ---
    Dispatcher,
    MemoryTransport,
    Result,
    RpcError,
    StreamConfig,
    StreamTransport,
    TransportPtr,
};

/// Builder for creating transport instances.
///
/// # Examples
///
/// ## In-process
/// ```no_run
/// use jsonrpc_duplex::{Dispatcher, TransportBuilder};
/// use std::sync::Arc;
///
/// # async fn example() -> jsonrpc_duplex::Result<()> {
/// let transport = TransportBuilder::new()
///     .uri("memory://")
///     .dispatcher(Arc::new(Dispatcher::new()))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## TCP with reconnect settings
/// ```no_run
/// use jsonrpc_duplex::TransportBuilder;
/// use std::time::Duration;
///
/// # async fn example() -> jsonrpc_duplex::Result<()> {
/// let transport = TransportBuilder::new()
///     .uri("tcp://127.0.0.1:7000")
///     .reconnect_delay(Duration::from_millis(250))
///     .max_reconnect_attempts(10)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// Use [`StreamTransport`] directly when the connection events are needed;
/// the builder only hands out the type-erased [`TransportPtr`].
#[derive(Default)]
pub struct TransportBuilder {
    uri: Option<String>,
    dispatcher: Option<Arc<Dispatcher>>,
    reconnect_delay: Option<Duration>,
    max_reconnect_attempts: Option<u32>,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl TransportBuilder {
    /// Create a new transport builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transport URI (required).
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Dispatcher served by a `memory://` transport.
    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Base reconnect delay of a `tcp://` transport.
    ///
    /// Default: 1s.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    /// Reconnect attempt cap of a `tcp://` transport.
    ///
    /// Default: 5.
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Single connect attempt limit of a `tcp://` transport.
    ///
    /// Default: 5s.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Per-exchange limit of an `http(s)://` transport.
    ///
    /// Default: 30s.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build the transport (consumes self).
    ///
    /// A `tcp://` transport is returned once its first connection is up.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `uri` is missing, or `dispatcher` is missing for `memory://`
    /// - the scheme is unknown or its support is not compiled in
    /// - the transport cannot be created or never connects
    pub async fn build(self) -> Result<TransportPtr> {
        // ---
        let uri = self
            .uri
            .clone()
            .ok_or_else(|| RpcError::MissingConfig("uri".into()))?;

        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| RpcError::Transport(format!("uri without scheme: {uri}")))?;

        match scheme {
            "memory" => {
                let dispatcher = self
                    .dispatcher
                    .ok_or_else(|| RpcError::MissingConfig("dispatcher".into()))?;
                Ok(MemoryTransport::create(dispatcher))
            }
            "tcp" => {
                if rest.is_empty() {
                    return Err(RpcError::MissingConfig("tcp address".into()));
                }
                let config = self.stream_config(rest);
                let transport = StreamTransport::connect(config).await?;
                Ok(Arc::new(transport))
            }
            "http" | "https" => self.build_http(uri.clone()),
            other => Err(RpcError::Transport(format!(
                "unrecognized transport scheme: {other}, valid schemes: memory, tcp, http, https"
            ))),
        }
    }

    fn stream_config(&self, address: &str) -> StreamConfig {
        // ---
        let mut config = StreamConfig::new(address.trim_end_matches('/'));
        if let Some(delay) = self.reconnect_delay {
            config = config.with_reconnect_delay(delay);
        }
        if let Some(attempts) = self.max_reconnect_attempts {
            config = config.with_max_reconnect_attempts(attempts);
        }
        if let Some(timeout) = self.connect_timeout {
            config = config.with_connect_timeout(timeout);
        }
        config
    }

    #[cfg(feature = "transport_http")]
    fn build_http(&self, url: String) -> Result<TransportPtr> {
        // ---
        let mut config = crate::HttpConfig::new(url);
        if let Some(timeout) = self.request_timeout {
            config = config.with_request_timeout(timeout);
        }
        crate::HttpTransport::create(config)
    }

    #[cfg(not(feature = "transport_http"))]
    fn build_http(&self, url: String) -> Result<TransportPtr> {
        Err(RpcError::Transport(format!(
            "{url}: http transport requires the transport_http feature"
        )))
    }
}
