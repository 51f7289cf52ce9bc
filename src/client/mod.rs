//! Client-side correlation engine.
//!
//! [`RpcClient`] turns fire-and-forget transport sends into awaitable calls:
//! it assigns every request an id, keeps one pending entry per outstanding
//! id, races each call against its own timer and matches incoming responses
//! back to their callers. When the transport reports a lost link, every
//! call still in flight fails with [`RpcError::ConnectionLost`].

mod builder;
mod pending;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::event::lock_ignore_poison;
use crate::protocol::parse_as_response;
use crate::schema::{AnyValue, Violation, Violations};
use crate::{
    // ---
    ClientConfig,
    EventSubscription,
    IdGeneratorPtr,
    Message,
    MethodContract,
    Notification,
    Request,
    RequestId,
    Response,
    Result,
    RpcError,
    SchemaPtr,
    SubscriberId,
    TransportPtr,
};
use pending::{PendingCall, PendingCalls};

pub use builder::RpcClientBuilder;

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Replaces the client's default request timeout for this call.
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// JSON-RPC client bound to one transport.
///
/// Cheap to clone; clones share the pending-call table and the transport.
/// Multiple calls may be in flight at once and may complete in any order.
///
/// # Example
///
/// ```no_run
/// use jsonrpc_duplex::{MemoryTransport, Dispatcher, RpcClient};
/// use serde::{Deserialize, Serialize};
/// use std::sync::Arc;
///
/// #[derive(Serialize, Deserialize)]
/// struct Echo { message: String }
///
/// # async fn example() -> jsonrpc_duplex::Result<()> {
/// let dispatcher = Arc::new(Dispatcher::new());
/// dispatcher.register("echo", |req: Echo| async move { Ok(req) })?;
///
/// let client = RpcClient::new(MemoryTransport::create(dispatcher));
/// let reply: Echo = client.call("echo", Echo { message: "hi".into() }).await?;
/// assert_eq!(reply.message, "hi");
///
/// client.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    transport: TransportPtr,
    ids: IdGeneratorPtr,
    config: ClientConfig,
    contracts: Mutex<HashMap<String, MethodContract>>,
    pending: Arc<PendingCalls>,

    // Shutdown state - new calls are refused once set
    shutting_down: AtomicBool,
    disconnected: AtomicBool,

    subscriber: SubscriberId,
    rx_task: Mutex<Option<JoinHandle<()>>>,

    lost_subscriber: Option<SubscriberId>,
    lost_task: Mutex<Option<JoinHandle<()>>>,
}

impl RpcClient {
    // ---

    /// Client with default settings and sequential ids.
    ///
    /// Must be called inside a tokio runtime; the receive loop is spawned
    /// immediately.
    pub fn new(transport: TransportPtr) -> Self {
        RpcClientBuilder::new(transport).build()
    }

    pub fn builder(transport: TransportPtr) -> RpcClientBuilder {
        RpcClientBuilder::new(transport)
    }

    pub(crate) fn from_parts(
        transport: TransportPtr,
        ids: IdGeneratorPtr,
        config: ClientConfig,
        contracts: Vec<MethodContract>,
    ) -> Self {
        // ---
        let subscription = transport.messages().subscribe();
        let lost = transport.connection_lost().map(|channel| channel.subscribe());
        let contracts = contracts
            .into_iter()
            .map(|c| (c.name.to_string(), c))
            .collect();

        let inner = Arc::new(Inner {
            transport,
            ids,
            config,
            contracts: Mutex::new(contracts),
            pending: Arc::new(PendingCalls::new()),
            shutting_down: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            subscriber: subscription.id,
            rx_task: Mutex::new(None),
            lost_subscriber: lost.as_ref().map(|sub| sub.id),
            lost_task: Mutex::new(None),
        });

        // The loop holds a weak reference so dropping the last client
        // tears it down.
        let task = Self::start_receive_task(Arc::downgrade(&inner), subscription);
        *lock_ignore_poison(&inner.rx_task) = Some(task);

        if let Some(lost) = lost {
            let task = Self::start_loss_task(Arc::downgrade(&inner), lost);
            *lock_ignore_poison(&inner.lost_task) = Some(task);
        }

        Self { inner }
    }

    // Start background task matching incoming responses to pending calls
    fn start_receive_task(
        inner: Weak<Inner>,
        mut subscription: EventSubscription<String>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            crate::log_debug!("client receive loop started");

            while let Some(text) = subscription.inbox.recv().await {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.handle_incoming(&text);
            }

            crate::log_debug!("client receive loop stopped");
        })
    }

    // Replies to calls sent over a dropped link never arrive; fail them now
    // instead of leaving them to their timers.
    fn start_loss_task(
        inner: Weak<Inner>,
        mut subscription: EventSubscription<String>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(reason) = subscription.inbox.recv().await {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.reject_pending(&reason);
            }
        })
    }

    /// Register or replace the params/result contract for a method.
    ///
    /// Calls to methods without a contract accept any params and result.
    pub fn register_contract(&self, contract: MethodContract) {
        lock_ignore_poison(&self.inner.contracts).insert(contract.name.to_string(), contract);
    }

    /// Call `method` with serde-typed params and result, using the default
    /// timeout.
    ///
    /// `()` as params sends no `params` member.
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.call_with_options(method, params, CallOptions::default())
            .await
    }

    /// Like [`call`](Self::call) with a per-call timeout.
    pub async fn call_with_timeout<P, R>(&self, method: &str, params: P, timeout: Duration) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.call_with_options(method, params, CallOptions::timeout(timeout))
            .await
    }

    pub async fn call_with_options<P, R>(
        &self,
        method: &str,
        params: P,
        options: CallOptions,
    ) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        // ---
        let params = match serde_json::to_value(params)? {
            Value::Null => None,
            value => Some(value),
        };

        let (id, result) = self.call_inner(method, params, options).await?;

        serde_json::from_value(result).map_err(|err| RpcError::InvalidResult {
            method: method.to_string(),
            id,
            violations: Violations::from(vec![Violation::new("", err.to_string())]),
        })
    }

    /// Call `method` with raw JSON params and get the validated raw result.
    pub async fn call_value(
        &self,
        method: &str,
        params: Option<Value>,
        options: CallOptions,
    ) -> Result<Value> {
        let (_id, result) = self.call_inner(method, params, options).await?;
        Ok(result)
    }

    async fn call_inner(
        &self,
        method: &str,
        params: Option<Value>,
        options: CallOptions,
    ) -> Result<(RequestId, Value)> {
        // ---
        let inner = &self.inner;
        if inner.shutting_down.load(Ordering::SeqCst) {
            return Err(RpcError::ShuttingDown);
        }

        let (params_schema, result_schema) = inner.schemas(method);
        let params = validate_params(method, &params_schema, params)?;

        let id = inner.ids.next_id();
        let (tx, mut rx) = oneshot::channel();
        let call = PendingCall::new(Arc::from(method), result_schema, tx);

        if !inner.pending.insert(id.clone(), call) {
            return Err(RpcError::Internal(format!(
                "request id {id} is already pending"
            )));
        }

        // Shutdown may have started between the check and the insert.
        if inner.shutting_down.load(Ordering::SeqCst) {
            if let Some(call) = inner.pending.claim(&id) {
                call.resolve(Err(RpcError::ShuttingDown));
            }
            return Err(RpcError::ShuttingDown);
        }

        let timeout = options.timeout.unwrap_or(inner.config.request_timeout);
        let timer = Self::start_timer(Arc::clone(&inner.pending), id.clone(), timeout);
        inner.pending.attach_timer(&id, timer);

        let message: Message = Request::new(method, params, id.clone()).into();
        // A transport may only return from send once the exchange is over
        // (in-process, HTTP); the timer or shutdown must still win then.
        let sent = tokio::select! {
            sent = inner.transport.send(&message) => sent,
            outcome = &mut rx => return Self::finish(id, outcome),
        };

        if let Err(err) = sent {
            // Unless a reply already claimed the call, the send failure is
            // its outcome.
            if let Some(call) = inner.pending.claim(&id) {
                crate::log_debug!("request {id} to '{method}' could not be sent: {err}");
                call.cancel();
                return Err(err);
            }
        }

        let outcome = rx.await;
        Self::finish(id, outcome)
    }

    fn finish(
        id: RequestId,
        outcome: std::result::Result<Result<Value>, oneshot::error::RecvError>,
    ) -> Result<(RequestId, Value)> {
        match outcome {
            Ok(result) => result.map(|value| (id, value)),
            Err(_) => Err(RpcError::Internal(format!("pending call {id} was dropped"))),
        }
    }

    // Fires independently of the response path; loses to any earlier claim.
    fn start_timer(pending: Arc<PendingCalls>, id: RequestId, timeout: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            if let Some(call) = pending.claim(&id) {
                let elapsed = call.created_at.elapsed();
                crate::log_debug!("request {id} to '{}' timed out after {elapsed:?}", call.method);
                call.resolve(Err(RpcError::Timeout { id, elapsed }));
            }
        })
    }

    /// Send a notification. No response is expected.
    ///
    /// Failures (params validation, transport) are logged and never
    /// returned.
    pub async fn notify<P>(&self, method: &str, params: P)
    where
        P: Serialize,
    {
        // ---
        match serde_json::to_value(params) {
            Ok(Value::Null) => self.notify_value(method, None).await,
            Ok(value) => self.notify_value(method, Some(value)).await,
            Err(_err) => {
                crate::log_warn!("notification '{method}' not sent: {_err}");
            }
        }
    }

    pub async fn notify_value(&self, method: &str, params: Option<Value>) {
        // ---
        let (params_schema, _) = self.inner.schemas(method);
        let params = match validate_params(method, &params_schema, params) {
            Ok(params) => params,
            Err(_err) => {
                crate::log_warn!("notification not sent: {_err}");
                return;
            }
        };

        let notification = Notification::new(method, params);
        if let Err(_err) = self.inner.transport.send(&notification.into()).await {
            crate::log_warn!("notification '{method}' failed to send: {_err}");
        }
    }

    /// Graceful shutdown with the configured shutdown timeout.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with_timeout(self.inner.config.shutdown_timeout)
            .await
    }

    /// Refuse new calls, wait up to `timeout` for pending calls to finish,
    /// reject whatever is left, then disconnect the transport.
    ///
    /// The transport is disconnected at most once, however many times this
    /// is called.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<()> {
        // ---
        let inner = &self.inner;
        inner.shutting_down.store(true, Ordering::SeqCst);

        let mut count = inner.pending.watch();
        let drained = tokio::time::timeout(timeout, count.wait_for(|n| *n == 0))
            .await
            .is_ok();

        if !drained {
            let remaining = inner.pending.drain();
            crate::log_warn!(
                "shutdown timed out; rejecting {} pending call(s)",
                remaining.len()
            );
            for (_id, call) in remaining {
                call.resolve(Err(RpcError::ShuttingDown));
            }
        }

        if !inner.disconnected.swap(true, Ordering::SeqCst) {
            inner.transport.disconnect().await?;
        }
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    pub fn transport(&self) -> &TransportPtr {
        &self.inner.transport
    }
}

fn validate_params(
    method: &str,
    schema: &SchemaPtr,
    params: Option<Value>,
) -> Result<Option<Value>> {
    // ---
    let raw = params.as_ref().unwrap_or(&Value::Null);
    match schema.parse(raw) {
        Ok(parsed) if params.is_some() => Ok(Some(parsed)),
        Ok(_) => Ok(None),
        Err(violations) => Err(RpcError::InvalidParams {
            method: method.to_string(),
            violations,
        }),
    }
}

impl Inner {
    // ---
    fn schemas(&self, method: &str) -> (SchemaPtr, SchemaPtr) {
        match lock_ignore_poison(&self.contracts).get(method) {
            Some(contract) => (contract.params.clone(), contract.result.clone()),
            None => {
                let any: SchemaPtr = Arc::new(AnyValue);
                (any.clone(), any)
            }
        }
    }

    fn reject_pending(&self, reason: &str) {
        // ---
        let calls = self.pending.drain();
        if calls.is_empty() {
            return;
        }

        crate::log_warn!(
            "connection lost ({reason}); rejecting {} pending call(s)",
            calls.len()
        );
        for (_id, call) in calls {
            call.resolve(Err(RpcError::ConnectionLost(reason.to_string())));
        }
    }

    fn handle_incoming(&self, text: &str) {
        // ---
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_err) => {
                crate::log_warn!("dropping undecodable message: {_err}");
                return;
            }
        };

        // Calls from the peer share the channel on duplex transports.
        if value.get("method").is_some() {
            crate::log_debug!("ignoring peer-initiated call");
            return;
        }

        let response = match parse_as_response(&value) {
            Ok(response) => response,
            Err(_violations) => {
                crate::log_warn!("dropping invalid response: {_violations}");
                return;
            }
        };

        let Some(id) = response.id().cloned() else {
            crate::log_warn!("dropping error response without id: {text}");
            return;
        };

        let Some(call) = self.pending.claim(&id) else {
            crate::log_debug!("no pending call for response id {id}");
            return;
        };

        let outcome = match response {
            Response::Success(ok) => {
                call.result_schema
                    .parse(&ok.result)
                    .map_err(|violations| RpcError::InvalidResult {
                        method: call.method.to_string(),
                        id: id.clone(),
                        violations,
                    })
            }
            Response::Error(err) => Err(RpcError::from_wire(err.error, id)),
        };
        call.resolve(outcome);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = lock_ignore_poison(&self.rx_task).take() {
            task.abort();
        }
        self.transport.messages().unsubscribe(self.subscriber);

        if let Some(task) = lock_ignore_poison(&self.lost_task).take() {
            task.abort();
        }
        if let (Some(id), Some(lost)) = (self.lost_subscriber, self.transport.connection_lost()) {
            lost.unsubscribe(id);
        }

        for (_id, call) in self.pending.drain() {
            call.resolve(Err(RpcError::ShuttingDown));
        }
    }
}
