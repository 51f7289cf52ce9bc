use std::sync::Arc;
use std::time::Duration;

use jsonrpc_duplex::{Dispatcher, MemoryTransport, Result, RpcClient, RpcError};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct Echo {
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AddRequest {
    a: i64,
    b: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct AddResponse {
    sum: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let dispatcher = Arc::new(Dispatcher::new());

    dispatcher.register("echo", |req: Echo| async move { Ok(req) })?;

    dispatcher.register("add", |req: AddRequest| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(AddResponse { sum: req.a + req.b })
    })?;

    dispatcher.on_notification("log", |line: String| async move {
        println!("server log: {line}");
        Ok(())
    })?;

    let client = RpcClient::builder(MemoryTransport::create(dispatcher))
        .request_timeout(Duration::from_secs(2))
        .build();

    let reply: Echo = client
        .call(
            "echo",
            Echo {
                message: "Hello, JSON-RPC!".into(),
            },
        )
        .await?;
    println!("echo: {}", reply.message);

    let resp: AddResponse = client.call("add", AddRequest { a: 20, b: 3 }).await?;
    println!("20 + 3 = {}", resp.sum);

    client.notify("log", "demo finished").await;

    match client.call::<_, Echo>("missing_method", ()).await {
        Err(RpcError::Remote { code, message, .. }) => println!("error {code}: {message}"),
        other => println!("unexpected: {other:?}"),
    }

    client.shutdown().await
}
