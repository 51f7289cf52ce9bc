use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::schema::{Violation, Violations};
use crate::{Result, RpcError};

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased async handler.
///
/// Receives params that already passed the method's params schema and
/// returns the raw result value; the dispatcher validates it afterwards.
pub(crate) trait HandlerFn: Send + Sync {
    fn call(&self, params: Value) -> BoxFuture<'static, Result<Value>>;
}

pub(crate) type HandlerPtr = Arc<dyn HandlerFn>;

// Handler working on raw JSON values.
pub(crate) struct RawHandler<F> {
    func: F,
}

impl<F> RawHandler<F> {
    pub(crate) fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> HandlerFn for RawHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn call(&self, params: Value) -> BoxFuture<'static, Result<Value>> {
        Box::pin((self.func)(params))
    }
}

// Handler over serde types; (de)serialization happens around the call.
pub(crate) struct TypedHandler<F, Fut, P, R> {
    method: Arc<str>,
    func: F,
    _phantom: PhantomData<fn(P, R, Fut)>,
}

impl<F, Fut, P, R> TypedHandler<F, Fut, P, R> {
    pub(crate) fn new(method: Arc<str>, func: F) -> Self {
        Self {
            method,
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut, P, R> HandlerFn for TypedHandler<F, Fut, P, R>
where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn call(&self, params: Value) -> BoxFuture<'static, Result<Value>> {
        // Contract schemas can be swapped out, so the type may still disagree.
        let params: P = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(err) => {
                let err = RpcError::InvalidParams {
                    method: self.method.to_string(),
                    violations: Violations::from(vec![Violation::new("", err.to_string())]),
                };
                return Box::pin(async move { Err(err) });
            }
        };

        let fut = (self.func)(params);

        Box::pin(async move {
            let result = fut.await?;
            Ok(serde_json::to_value(result)?)
        })
    }
}

/// Run a handler future, turning a panic into an internal error.
pub(crate) async fn call_guarded(handler: &HandlerPtr, params: Value) -> Result<Value> {
    // ---
    // The handler may panic before its future is ever polled.
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| handler.call(params))) {
        Ok(fut) => fut,
        Err(payload) => return Err(panicked(payload)),
    };

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(panicked(payload)),
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> RpcError {
    RpcError::Internal(format!(
        "handler panicked: {}",
        panic_message(payload.as_ref())
    ))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
