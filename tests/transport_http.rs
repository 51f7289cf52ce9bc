#![cfg(feature = "transport_http")]

mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use common::{init_logging, math_dispatcher, AddRequest, AddResponse, Echo};
use jsonrpc_duplex::{
    // ---
    http_router,
    Dispatcher,
    HttpConfig,
    HttpTransport,
    Message,
    Notification,
    Result,
    RpcClient,
    RpcError,
    Transport,
    TransportBuilder,
};

async fn serve(dispatcher: Arc<Dispatcher>) -> (SocketAddr, JoinHandle<()>) {
    // ---
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, http_router(dispatcher)).await;
    });
    (addr, server)
}

#[tokio::test]
async fn test_call_over_http() -> Result<()> {
    // ---
    init_logging();

    let (addr, server) = serve(math_dispatcher()).await;

    let transport = TransportBuilder::new()
        .uri(format!("http://{addr}/"))
        .request_timeout(Duration::from_secs(5))
        .build()
        .await?;
    let client = RpcClient::new(transport);

    let reply: Echo = client
        .call(
            "echo",
            Echo {
                message: "over http".into(),
            },
        )
        .await?;
    assert_eq!(reply.message, "over http");

    let sum: AddResponse = client.call("add", AddRequest { a: 40, b: 2 }).await?;
    assert_eq!(sum.sum, 42);

    let err = client
        .call::<_, Value>("missing_method", json!({}))
        .await
        .unwrap_err();
    assert!(err.is_method_not_found());

    client.shutdown().await?;
    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_notification_gets_no_content() -> Result<()> {
    // ---
    init_logging();

    let seen = Arc::new(AtomicUsize::new(0));
    let dispatcher = math_dispatcher();
    {
        let seen = seen.clone();
        dispatcher.on_notification("ping", move |_: Value| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })?;
    }
    let (addr, server) = serve(dispatcher).await;

    let transport = HttpTransport::new(HttpConfig::new(format!("http://{addr}/")))?;
    let mut wire = transport.messages().subscribe();

    // Act
    transport
        .send(&Message::Notification(Notification::new("ping", None)))
        .await?;

    // Assert
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(wire.inbox.try_recv().is_err());

    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_empty_error_status_fails_the_call() -> Result<()> {
    // ---
    init_logging();

    let (addr, server) = serve(math_dispatcher()).await;

    // Nothing is routed here, so the server answers 404 with no body.
    let transport = HttpTransport::create(HttpConfig::new(format!("http://{addr}/nowhere")))?;
    let client = RpcClient::new(transport);

    let err = client
        .call::<_, Echo>("echo", Echo { message: "x".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Transport(_)), "got {err:?}");
    assert_eq!(client.pending_count(), 0);

    client.shutdown().await?;
    server.abort();
    Ok(())
}
