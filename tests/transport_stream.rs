mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use common::{init_logging, math_dispatcher, within, AddRequest, AddResponse, Echo};
use jsonrpc_duplex::{
    // ---
    serve_connection,
    spawn_tcp_server,
    ConnectionEvent,
    ConnectionState,
    EventSubscription,
    Request,
    RequestId,
    Response,
    Result,
    RpcClient,
    RpcError,
    StreamConfig,
    StreamTransport,
    Transport,
    TransportBuilder,
};

const WAIT: Duration = Duration::from_secs(3);

async fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr)
}

async fn next_event(events: &mut EventSubscription<ConnectionEvent>) -> ConnectionEvent {
    within(WAIT, events.inbox.recv())
        .await
        .expect("event channel closed")
}

/// Server answering every request with its method name, after first
/// pushing a peer-initiated notification.
async fn scripted_server(listener: TcpListener) {
    // ---
    let (socket, _) = listener.accept().await.expect("accept");
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let request: Value = serde_json::from_str(&line).expect("request json");
        let push = json!({ "jsonrpc": "2.0", "method": "tick" });
        let reply = json!({
            "jsonrpc": "2.0",
            "result": request["method"],
            "id": request["id"],
        });

        let out = format!("{push}\n{reply}\n");
        if writer.write_all(out.as_bytes()).await.is_err() {
            return;
        }
    }
}

#[tokio::test]
async fn test_client_over_tcp() -> Result<()> {
    // ---
    init_logging();

    let (listener, addr) = listen().await;
    let server = spawn_tcp_server(listener, math_dispatcher());

    let transport = TransportBuilder::new()
        .uri(format!("tcp://{addr}"))
        .build()
        .await?;
    let client = RpcClient::new(transport);

    // Act
    let reply: Echo = client
        .call(
            "echo",
            Echo {
                message: "over tcp".into(),
            },
        )
        .await?;

    let err = client
        .call::<_, Value>("missing_method", json!({}))
        .await
        .unwrap_err();

    // Assert
    assert_eq!(reply.message, "over tcp");
    assert!(err.is_method_not_found());

    client.shutdown().await?;
    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_concurrent_calls_over_one_connection() -> Result<()> {
    // ---
    init_logging();

    let (listener, addr) = listen().await;
    let server = spawn_tcp_server(listener, math_dispatcher());

    let transport = StreamTransport::connect(StreamConfig::new(addr.to_string())).await?;
    let client = RpcClient::new(Arc::new(transport));

    let mut handles = Vec::new();
    for i in 0..20i64 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let resp: AddResponse = client.call("add", AddRequest { a: i, b: 100 }).await?;
            Ok::<_, RpcError>((i, resp.sum))
        }));
    }

    for handle in handles {
        let (i, sum) = within(WAIT, handle).await.expect("task")?;
        assert_eq!(sum, i + 100);
    }

    client.shutdown().await?;
    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_notification_reaches_server() -> Result<()> {
    // ---
    init_logging();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = math_dispatcher();
    dispatcher.on_notification("log", move |line: String| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(line);
            Ok(())
        }
    })?;

    let (listener, addr) = listen().await;
    let server = spawn_tcp_server(listener, dispatcher);

    let transport = StreamTransport::connect(StreamConfig::new(addr.to_string())).await?;
    let client = RpcClient::new(Arc::new(transport));

    client.notify("log", "hello").await;

    let seen = within(WAIT, rx.recv()).await;
    assert_eq!(seen.as_deref(), Some("hello"));

    client.shutdown().await?;
    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_request_takes_replies_in_order() -> Result<()> {
    // ---
    init_logging();

    let (listener, addr) = listen().await;
    let server = tokio::spawn(scripted_server(listener));

    let transport = StreamTransport::connect(StreamConfig::new(addr.to_string())).await?;
    let mut wire = transport.messages().subscribe();

    // Act
    let first = transport
        .request(&Request::new("first", None, RequestId::Number(1)))
        .await?;
    let second = transport
        .request(&Request::new("second", None, RequestId::Number(2)))
        .await?;

    // Assert: the pushed notifications did not consume a reply slot
    match (first, second) {
        (Response::Success(a), Response::Success(b)) => {
            assert_eq!(a.result, json!("first"));
            assert_eq!(b.result, json!("second"));
        }
        other => panic!("unexpected replies {other:?}"),
    }

    // Every line, pushes included, reached the message channel.
    let mut methods = Vec::new();
    for _ in 0..4 {
        let line = within(WAIT, wire.inbox.recv()).await.expect("line");
        let value: Value = serde_json::from_str(&line)?;
        methods.push(value.get("method").cloned());
    }
    assert_eq!(methods.iter().filter(|m| m.is_some()).count(), 2);

    transport.disconnect().await?;
    assert_eq!(transport.state(), ConnectionState::Closed);
    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_reconnects_after_server_drops_connection() -> Result<()> {
    // ---
    init_logging();

    let (listener, addr) = listen().await;
    let dispatcher = math_dispatcher();

    // Drop the first connection, serve the second.
    let server = tokio::spawn(async move {
        let (first, _) = listener.accept().await.expect("accept first");
        drop(first);
        let (second, _) = listener.accept().await.expect("accept second");
        let _ = serve_connection(second, dispatcher).await;
    });

    let delay = Duration::from_millis(20);
    let transport = StreamTransport::spawn(
        StreamConfig::new(addr.to_string())
            .with_reconnect_delay(delay)
            .with_max_reconnect_attempts(3),
    );
    let mut events = transport.events().subscribe();

    // Assert the lifecycle
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::Reconnecting { attempt: 1, delay }
    );
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(transport.state(), ConnectionState::Connected);

    // The new connection carries calls again.
    let client = RpcClient::new(Arc::new(transport));
    let reply: Echo = client
        .call(
            "echo",
            Echo {
                message: "back".into(),
            },
        )
        .await?;
    assert_eq!(reply.message, "back");

    client.shutdown().await?;
    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_waiters_fail_when_connection_drops() -> Result<()> {
    // ---
    init_logging();

    let (listener, addr) = listen().await;

    // Read one request, then hang up without answering.
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let mut lines = BufReader::new(socket).lines();
        let _ = lines.next_line().await;
    });

    let transport = StreamTransport::connect(
        StreamConfig::new(addr.to_string()).with_reconnect_delay(Duration::from_secs(5)),
    )
    .await?;

    let err = within(
        WAIT,
        transport.request(&Request::new("echo", None, RequestId::Number(1))),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RpcError::ConnectionLost(_)), "got {err:?}");

    transport.disconnect().await?;
    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_send_while_reconnecting_and_after_giving_up() -> Result<()> {
    // ---
    init_logging();

    let (listener, addr) = listen().await;

    // Accept once, then go away for good.
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        drop(socket);
    });

    let transport = StreamTransport::spawn(
        StreamConfig::new(addr.to_string())
            .with_reconnect_delay(Duration::from_millis(200))
            .with_max_reconnect_attempts(1),
    );
    let mut events = transport.events().subscribe();
    let request = Request::new("echo", None, RequestId::Number(1));

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);
    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Reconnecting { attempt: 1, .. }
    ));

    // Act: send during the back-off
    let err = transport.send(&request.clone().into()).await.unwrap_err();
    assert!(matches!(err, RpcError::NotConnected), "got {err:?}");

    // The only reconnect attempt is refused.
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::MaxReconnectAttemptsReached
    );
    let err = transport.wait_connected().await.unwrap_err();
    assert!(matches!(err, RpcError::MaxReconnectAttempts(1)), "got {err:?}");
    assert_eq!(transport.state(), ConnectionState::Failed);

    let err = transport.send(&request.into()).await.unwrap_err();
    assert!(matches!(err, RpcError::MaxReconnectAttempts(1)), "got {err:?}");

    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_client_call_fails_when_connection_drops() -> Result<()> {
    // ---
    init_logging();

    let (listener, addr) = listen().await;

    // Read one request, then hang up without answering.
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let mut lines = BufReader::new(socket).lines();
        let _ = lines.next_line().await;
    });

    let transport = StreamTransport::connect(
        StreamConfig::new(addr.to_string()).with_reconnect_delay(Duration::from_secs(5)),
    )
    .await?;
    let client = RpcClient::new(Arc::new(transport));

    // Act
    let started = Instant::now();
    let err = client
        .call_with_timeout::<_, Value>("echo", json!({}), Duration::from_secs(2))
        .await
        .unwrap_err();

    // Assert: rejected on the hang-up, well before the call's own timer
    assert!(matches!(err, RpcError::ConnectionLost(_)), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(client.pending_count(), 0);

    client.shutdown().await?;
    server.abort();
    Ok(())
}

#[tokio::test]
async fn test_overlong_line_drops_connection() -> Result<()> {
    // ---
    init_logging();

    let (listener, addr) = listen().await;

    // Stream bytes that never end a line, and keep the socket open.
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let _ = socket.write_all(&[b'x'; 256]).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let transport = StreamTransport::spawn(
        StreamConfig::new(addr.to_string())
            .with_reconnect_delay(Duration::from_secs(5))
            .with_max_line_length(64),
    );
    let mut events = transport.events().subscribe();
    let mut lost = transport
        .connection_lost()
        .expect("stream transport reports lost links")
        .subscribe();

    assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected);
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);

    let reason = within(WAIT, lost.inbox.recv()).await.expect("loss reason");
    assert!(reason.contains("64 byte limit"), "got {reason}");

    transport.disconnect().await?;
    server.abort();
    Ok(())
}
