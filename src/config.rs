//! Public, transport-agnostic configuration.
//!
//! These types carry plain values only. Loading them from files, flags or
//! the environment is left to the embedding application.

use std::time::Duration;

use crate::reconnect::ReconnectPolicy;

/// Default time a call waits for its response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time graceful shutdown waits for pending calls to drain.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Client correlation settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // ---
    /// Timeout for each call unless overridden per call.
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// How long graceful shutdown waits for pending calls before
    /// force-rejecting them.
    ///
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Default cap on one incoming line of the stream transport, delimiter
/// excluded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// Stream (TCP, newline-delimited) transport settings.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    // ---
    /// Peer address, `host:port`.
    pub address: String,

    /// Reconnect back-off and attempt cap.
    pub reconnect: ReconnectPolicy,

    /// Upper bound on a single connect attempt.
    ///
    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// Longest incoming line accepted before the connection is dropped.
    ///
    /// Default: 8 MiB
    pub max_line_length: usize,
}

impl StreamConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(5),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Base delay; attempt `n` waits `n × delay`.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect.delay = delay;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.reconnect.max_attempts = attempts;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    // ---
    /// Endpoint receiving `POST`ed messages.
    pub url: String,

    /// Upper bound on one HTTP exchange.
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,
}

impl HttpConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
