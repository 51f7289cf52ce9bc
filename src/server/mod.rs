//! Server-side dispatch.
//!
//! A [`Dispatcher`] owns the method registry and runs every incoming message
//! through the same sequence:
//!
//! 1. decode the text (failure → `ParseError`, id `null`)
//! 2. classify by `id` presence and validate the shape (a bad request gets
//!    `InvalidRequest`; a bad notification is dropped)
//! 3. look up the method (unknown → `MethodNotFound`)
//! 4. validate params against the method contract (→ `InvalidParameters`)
//! 5. invoke the handler and validate its result
//!
//! Requests always get exactly one response. Notifications never get one,
//! whatever the outcome.

mod handler;
mod stream;

#[cfg(feature = "transport_http")]
mod http;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::event::lock_ignore_poison;
use crate::protocol::{extract_id, parse_as_notification, parse_as_request};
use crate::schema::Typed;
use crate::{
    // ---
    ErrorCode,
    MethodContract,
    Notification,
    Request,
    Response,
    Result,
    RpcError,
};
use handler::{call_guarded, HandlerPtr, RawHandler, TypedHandler};

pub use stream::{serve_connection, spawn_tcp_server};

#[cfg(feature = "transport_http")]
pub use http::router as http_router;

type UnroutedHook = Arc<dyn Fn(&str, Option<&Value>) + Send + Sync>;
type NotificationErrorHook = Arc<dyn Fn(&str, &RpcError) + Send + Sync>;

/// A registered method: its contract plus the handler body.
#[derive(Clone)]
struct MethodEntry {
    contract: MethodContract,
    handler: HandlerPtr,
}

#[derive(Default)]
struct Registry {
    methods: HashMap<String, MethodEntry>,
    notifications: HashMap<String, MethodEntry>,
}

/// Routes requests and notifications to registered handlers.
///
/// Registration takes `&self`, so a dispatcher can be shared behind an
/// `Arc` with transports and servers and still grow its method set.
/// Entries are immutable once registered.
#[derive(Default)]
pub struct Dispatcher {
    registry: Mutex<Registry>,
    on_unrouted: Mutex<Option<UnroutedHook>>,
    on_notification_error: Mutex<Option<NotificationErrorHook>>,
}

impl Dispatcher {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method working on raw JSON values.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::DuplicateMethod`] if the name is already taken.
    pub fn register_method<F, Fut>(&self, contract: MethodContract, handler: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: HandlerPtr = Arc::new(RawHandler::new(handler));
        self.insert(contract, handler, Kind::Method)
    }

    /// Register a method whose params and result are serde types.
    ///
    /// ```no_run
    /// use jsonrpc_duplex::Dispatcher;
    /// use serde::{Deserialize, Serialize};
    ///
    /// #[derive(Serialize, Deserialize)]
    /// struct Add { a: i64, b: i64 }
    ///
    /// # fn example() -> jsonrpc_duplex::Result<()> {
    /// let dispatcher = Dispatcher::new();
    /// dispatcher.register("add", |req: Add| async move { Ok(req.a + req.b) })?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn register<P, R, F, Fut>(&self, method: &str, handler: F) -> Result<()>
    where
        P: DeserializeOwned + Serialize + Send + 'static,
        R: DeserializeOwned + Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let contract = MethodContract::typed::<P, R>(method);
        let handler: HandlerPtr = Arc::new(TypedHandler::new(contract.name.clone(), handler));
        self.insert(contract, handler, Kind::Method)
    }

    /// Register a notification handler working on raw JSON values.
    ///
    /// Only the contract's params schema is used.
    pub fn register_notification<F, Fut>(&self, contract: MethodContract, handler: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler: HandlerPtr = Arc::new(RawHandler::new(move |params: Value| {
            let fut = handler(params);
            async move { fut.await.map(|()| Value::Null) }
        }));
        self.insert(contract, handler, Kind::Notification)
    }

    /// Register a notification handler whose params are a serde type.
    pub fn on_notification<P, F, Fut>(&self, method: &str, handler: F) -> Result<()>
    where
        P: DeserializeOwned + Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let contract = MethodContract::new(method).with_params(Typed::<P>::new());
        let handler: HandlerPtr = Arc::new(TypedHandler::new(contract.name.clone(), handler));
        self.insert(contract, handler, Kind::Notification)
    }

    /// Hook receiving `(method, params)` whenever a message finds no route
    /// (unknown method or params failing validation).
    ///
    /// Purely diagnostic; it never changes what goes on the wire.
    pub fn on_unrouted<F>(&self, hook: F)
    where
        F: Fn(&str, Option<&Value>) + Send + Sync + 'static,
    {
        *lock_ignore_poison(&self.on_unrouted) = Some(Arc::new(hook));
    }

    /// Hook receiving failures of notification handlers, which have no
    /// response to carry them.
    pub fn on_notification_error<F>(&self, hook: F)
    where
        F: Fn(&str, &RpcError) + Send + Sync + 'static,
    {
        *lock_ignore_poison(&self.on_notification_error) = Some(Arc::new(hook));
    }

    /// True if `name` is registered as a method.
    pub fn has_method(&self, name: &str) -> bool {
        lock_ignore_poison(&self.registry).methods.contains_key(name)
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock_ignore_poison(&self.registry)
            .methods
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Handle one raw message and return the encoded response, if any.
    pub async fn handle_text(&self, raw: &str) -> Option<String> {
        // ---
        let response = self.handle_raw(raw).await?;
        match response.encode() {
            Ok(text) => Some(text),
            Err(_err) => {
                crate::log_error!("failed to encode response: {_err}");
                None
            }
        }
    }

    /// Handle one raw message. `None` means nothing must be sent back.
    pub async fn handle_raw(&self, raw: &str) -> Option<Response> {
        // ---
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.handle_value(value).await,
            Err(err) => {
                crate::log_debug!("undecodable message: {err}");
                let err = RpcError::Decode(err.to_string());
                Some(Response::error(err.to_error_object(), None))
            }
        }
    }

    /// Handle one decoded message.
    pub async fn handle_value(&self, value: Value) -> Option<Response> {
        // ---
        // Non-objects are answered as malformed requests.
        let has_id = value.as_object().map_or(true, |obj| obj.contains_key("id"));

        if has_id {
            match parse_as_request(&value) {
                Ok(request) => Some(self.dispatch_request(request).await),
                Err(violations) => {
                    crate::log_debug!("invalid request: {violations}");
                    let err = RpcError::InvalidMessage(violations);
                    Some(Response::error(err.to_error_object(), extract_id(&value)))
                }
            }
        } else {
            match parse_as_notification(&value) {
                Ok(notification) => {
                    self.dispatch_notification(notification).await;
                }
                Err(_violations) => {
                    crate::log_debug!("dropping invalid notification: {_violations}");
                }
            }
            None
        }
    }

    async fn dispatch_request(&self, request: Request) -> Response {
        // ---
        let Request {
            method, params, id, ..
        } = request;

        match self.invoke(&method, params, Kind::Method).await {
            Ok(result) => Response::success(result, id),
            Err(err) => {
                crate::log_debug!("request {id} to '{method}' failed: {err}");
                Response::error(err.to_error_object(), Some(id))
            }
        }
    }

    async fn dispatch_notification(&self, notification: Notification) {
        // ---
        let Notification { method, params, .. } = notification;

        if let Err(err) = self.invoke(&method, params, Kind::Notification).await {
            crate::log_warn!("notification '{method}' failed: {err}");
            let hook = lock_ignore_poison(&self.on_notification_error).clone();
            if let Some(hook) = hook {
                hook(&method, &err);
            }
        }
    }

    async fn invoke(&self, method: &str, params: Option<Value>, kind: Kind) -> Result<Value> {
        // ---
        let Some(entry) = self.lookup(method, kind) else {
            self.unrouted(method, params.as_ref());
            return Err(RpcError::MethodNotFound(method.to_string()));
        };

        let raw = params.unwrap_or(Value::Null);
        let params = match entry.contract.params.parse(&raw) {
            Ok(params) => params,
            Err(violations) => {
                self.unrouted(method, Some(&raw));
                return Err(RpcError::InvalidParams {
                    method: method.to_string(),
                    violations,
                });
            }
        };

        let result = call_guarded(&entry.handler, params).await?;

        entry.contract.result.parse(&result).map_err(|violations| {
            RpcError::server_with_data(
                ErrorCode::InternalServerError.code(),
                format!("handler for '{method}' returned an invalid result: {violations}"),
                violations.to_value(),
            )
        })
    }

    fn lookup(&self, method: &str, kind: Kind) -> Option<MethodEntry> {
        let registry = lock_ignore_poison(&self.registry);
        match kind {
            Kind::Method => registry.methods.get(method).cloned(),
            // Methods also accept notification-style calls; the result is discarded.
            Kind::Notification => registry
                .notifications
                .get(method)
                .or_else(|| registry.methods.get(method))
                .cloned(),
        }
    }

    fn unrouted(&self, method: &str, params: Option<&Value>) {
        let hook = lock_ignore_poison(&self.on_unrouted).clone();
        if let Some(hook) = hook {
            hook(method, params);
        }
    }

    fn insert(&self, contract: MethodContract, handler: HandlerPtr, kind: Kind) -> Result<()> {
        // ---
        let mut registry = lock_ignore_poison(&self.registry);
        let table = match kind {
            Kind::Method => &mut registry.methods,
            Kind::Notification => &mut registry.notifications,
        };

        let name = contract.name.to_string();
        if table.contains_key(&name) {
            return Err(RpcError::DuplicateMethod(name));
        }

        crate::log_debug!("registered {kind:?} '{name}'");
        table.insert(name, MethodEntry { contract, handler });
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Method,
    Notification,
}
