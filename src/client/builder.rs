//! RPC client builder.
//!
//! Fluent configuration of an [`RpcClient`]: id generation, timeouts and
//! method contracts.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    // ---
    ClientConfig,
    IdGenerator,
    IdGeneratorPtr,
    MethodContract,
    RpcClient,
    SequentialIds,
    TransportPtr,
};

/// Builder for [`RpcClient`].
///
/// # Example
///
/// ```no_run
/// use jsonrpc_duplex::{RpcClientBuilder, StreamConfig, StreamTransport, UuidIds};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> jsonrpc_duplex::Result<()> {
/// let transport = StreamTransport::connect(StreamConfig::new("127.0.0.1:7000")).await?;
///
/// let client = RpcClientBuilder::new(Arc::new(transport))
///     .id_generator(UuidIds)
///     .request_timeout(Duration::from_secs(5))
///     .shutdown_timeout(Duration::from_secs(1))
///     .build();
/// # Ok(())
/// # }
/// ```
pub struct RpcClientBuilder {
    // ---
    transport: TransportPtr,
    ids: Option<IdGeneratorPtr>,
    config: ClientConfig,
    contracts: Vec<MethodContract>,
}

impl RpcClientBuilder {
    // ---
    pub fn new(transport: TransportPtr) -> Self {
        Self {
            transport,
            ids: None,
            config: ClientConfig::default(),
            contracts: Vec::new(),
        }
    }

    /// Source of request ids.
    ///
    /// Default: [`SequentialIds`] starting at 1.
    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        let ids: IdGeneratorPtr = Arc::new(ids);
        self.ids = Some(ids);
        self
    }

    /// Share an id generator between several clients.
    pub fn shared_id_generator(mut self, ids: IdGeneratorPtr) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Default per-call timeout.
    ///
    /// Default: 30s.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// How long [`RpcClient::shutdown`] waits for pending calls.
    ///
    /// Default: 5s.
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Replace all timeouts at once.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate params and results of `contract.name` calls.
    pub fn contract(mut self, contract: MethodContract) -> Self {
        self.contracts.push(contract);
        self
    }

    /// Build the client (consumes self) and start its receive loop.
    pub fn build(self) -> RpcClient {
        // ---
        let ids: IdGeneratorPtr = match self.ids {
            Some(ids) => ids,
            None => Arc::new(SequentialIds::new()),
        };

        RpcClient::from_parts(self.transport, ids, self.config, self.contracts)
    }
}
