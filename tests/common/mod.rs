// tests/common/mod.rs

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Once};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use jsonrpc_duplex::Dispatcher;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddRequest {
    pub a: i64,
    pub b: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddResponse {
    pub sum: i64,
}

/// Dispatcher with `echo` and `add`.
pub fn math_dispatcher() -> Arc<Dispatcher> {
    // ---
    let dispatcher = Arc::new(Dispatcher::new());

    dispatcher
        .register("echo", |req: Echo| async move { Ok(req) })
        .expect("register echo");

    dispatcher
        .register("add", |req: AddRequest| async move {
            Ok(AddResponse { sum: req.a + req.b })
        })
        .expect("register add");

    dispatcher
}

/// Await `fut`, failing the test if it takes longer than `limit`.
pub async fn within<F: Future>(limit: Duration, fut: F) -> F::Output {
    tokio::time::timeout(limit, fut)
        .await
        .expect("timed out waiting for future")
}

pub fn init_logging() {
    // ---
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
