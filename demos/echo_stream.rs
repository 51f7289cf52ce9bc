//! Client and server over newline-delimited JSON on a loopback TCP socket.
//!
//! ```text
//! RUST_LOG=jsonrpc_duplex=debug cargo run --example echo_stream
//! ```

use std::sync::Arc;
use std::time::Duration;

use jsonrpc_duplex::{
    spawn_tcp_server, ConnectionEvent, Dispatcher, Result, RpcClient, StreamConfig,
    StreamTransport,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct Echo {
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let dispatcher = Arc::new(Dispatcher::new());
    dispatcher.register("echo", |req: Echo| async move { Ok(req) })?;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|err| jsonrpc_duplex::RpcError::Transport(err.to_string()))?;
    let addr = listener
        .local_addr()
        .map_err(|err| jsonrpc_duplex::RpcError::Transport(err.to_string()))?;
    let server = spawn_tcp_server(listener, dispatcher);

    let transport = StreamTransport::spawn(
        StreamConfig::new(addr.to_string())
            .with_reconnect_delay(Duration::from_millis(250))
            .with_max_reconnect_attempts(3),
    );

    let mut events = transport.events().subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.inbox.recv().await {
            match event {
                ConnectionEvent::Reconnecting { attempt, delay } => {
                    println!("reconnecting (attempt {attempt}) in {delay:?}")
                }
                other => println!("connection: {other:?}"),
            }
        }
    });

    transport.wait_connected().await?;
    let client = RpcClient::new(Arc::new(transport));

    for word in ["one", "two", "three"] {
        let reply: Echo = client
            .call(
                "echo",
                Echo {
                    message: word.into(),
                },
            )
            .await?;
        println!("echo: {}", reply.message);
    }

    client.shutdown().await?;
    server.abort();
    Ok(())
}
