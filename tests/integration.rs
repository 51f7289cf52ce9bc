mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use common::{init_logging, math_dispatcher, within, AddRequest, AddResponse, Echo};
use jsonrpc_duplex::{
    // ---
    CallOptions,
    Dispatcher,
    EventChannel,
    MemoryTransport,
    Message,
    RequestId,
    Result,
    RpcClient,
    RpcError,
    Transport,
};

/// Memory transport that remembers what went out and counts disconnects.
struct RecordingTransport {
    // ---
    inner: MemoryTransport,
    sent: Mutex<Vec<Message>>,
    disconnects: AtomicUsize,
}

impl RecordingTransport {
    fn new(dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryTransport::new(dispatcher),
            sent: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        })
    }

    fn request_ids(&self) -> Vec<RequestId> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|msg| match msg {
                Message::Request(req) => Some(req.id.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    // ---
    async fn send(&self, message: &Message) -> Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        self.inner.send(message).await
    }

    fn messages(&self) -> &EventChannel<String> {
        self.inner.messages()
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Dispatcher whose `sleep` method waits `ms` milliseconds before answering.
fn sleepy_dispatcher() -> Arc<Dispatcher> {
    // ---
    let dispatcher = math_dispatcher();
    dispatcher
        .register("sleep", |ms: u64| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(ms)
        })
        .expect("register sleep");
    dispatcher
}

#[tokio::test]
async fn test_echo_round_trip() -> Result<()> {
    // ---
    init_logging();

    let client = RpcClient::new(MemoryTransport::create(math_dispatcher()));

    let reply: Echo = client
        .call(
            "echo",
            Echo {
                message: "Hello, JSON-RPC!".into(),
            },
        )
        .await?;

    assert_eq!(reply.message, "Hello, JSON-RPC!");
    assert_eq!(client.pending_count(), 0);

    client.shutdown().await
}

#[tokio::test]
async fn test_unknown_method_is_reported_by_name() -> Result<()> {
    // ---
    init_logging();

    let client = RpcClient::new(MemoryTransport::create(math_dispatcher()));

    let err = client
        .call::<_, Value>("missing_method", json!({}))
        .await
        .unwrap_err();

    assert!(err.is_method_not_found());
    assert_eq!(err.code(), -32601);
    assert!(err.to_string().contains("missing_method"));

    client.shutdown().await
}

#[tokio::test]
async fn test_notification_gets_no_response() -> Result<()> {
    // ---
    init_logging();

    let seen = Arc::new(AtomicUsize::new(0));
    let dispatcher = math_dispatcher();
    {
        let seen = seen.clone();
        dispatcher.on_notification("log", move |_line: String| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })?;
    }

    let transport = Arc::new(MemoryTransport::new(dispatcher));
    let mut wire = transport.messages().subscribe();
    let client = RpcClient::new(transport.clone());

    // Act
    client.notify("log", "started").await;

    // Assert
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(wire.inbox.try_recv().is_err(), "notification must not be answered");
    assert_eq!(client.pending_count(), 0);

    client.shutdown().await
}

#[tokio::test]
async fn test_call_times_out_and_late_reply_is_dropped() -> Result<()> {
    // ---
    init_logging();

    let transport = Arc::new(MemoryTransport::new(sleepy_dispatcher()));
    let client = RpcClient::new(transport.clone());

    // Arrange
    let timeout = Duration::from_millis(100);
    let started = Instant::now();

    // Act
    let err = client
        .call_with_timeout::<_, u64>("sleep", 250u64, timeout)
        .await
        .unwrap_err();

    // Assert
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    match err {
        RpcError::Timeout { elapsed, .. } => assert!(elapsed >= timeout),
        other => panic!("unexpected {other:?}"),
    }
    assert!(started.elapsed() >= timeout);
    assert!(started.elapsed() < Duration::from_millis(240));
    assert_eq!(client.pending_count(), 0);

    // A late reply to the timed-out call must not disturb later calls.
    transport.inject(r#"{"jsonrpc":"2.0","result":250,"id":1}"#);
    let reply: u64 = client
        .call_with_options("sleep", 1u64, CallOptions::timeout(Duration::from_secs(2)))
        .await?;
    assert_eq!(reply, 1);

    client.shutdown().await
}

#[tokio::test]
async fn test_shutdown_waits_for_pending_call() -> Result<()> {
    // ---
    init_logging();

    let transport = RecordingTransport::new(sleepy_dispatcher());
    let client = RpcClient::builder(transport.clone())
        .shutdown_timeout(Duration::from_millis(500))
        .build();

    // Arrange: one call that answers after 50ms
    let caller = {
        let client = client.clone();
        tokio::spawn(async move { client.call::<_, u64>("sleep", 50u64).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(client.pending_count(), 1);

    // Act
    let started = Instant::now();
    within(Duration::from_secs(2), client.shutdown()).await?;

    // Assert: the call resolved normally before shutdown returned
    assert!(started.elapsed() >= Duration::from_millis(20));
    let value = caller.await.expect("caller task")?;
    assert_eq!(value, 50);
    assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);

    let err = client.call::<_, u64>("sleep", 1u64).await.unwrap_err();
    assert!(matches!(err, RpcError::ShuttingDown));
    Ok(())
}

#[tokio::test]
async fn test_shutdown_timeout_rejects_leftover_calls() -> Result<()> {
    // ---
    init_logging();

    let transport = RecordingTransport::new(sleepy_dispatcher());
    let client = RpcClient::new(transport.clone());

    let caller = {
        let client = client.clone();
        tokio::spawn(async move { client.call::<_, u64>("sleep", 2_000u64).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let started = Instant::now();
    within(
        Duration::from_secs(1),
        client.shutdown_with_timeout(Duration::from_millis(50)),
    )
    .await?;

    assert!(started.elapsed() < Duration::from_secs(1));
    let err = caller.await.expect("caller task").unwrap_err();
    assert!(matches!(err, RpcError::ShuttingDown), "got {err:?}");
    assert_eq!(client.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_transport_disconnected_once() -> Result<()> {
    // ---
    init_logging();

    let transport = RecordingTransport::new(math_dispatcher());
    let client = RpcClient::new(transport.clone());

    client.shutdown().await?;
    client.clone().shutdown().await?;
    client.shutdown_with_timeout(Duration::ZERO).await?;

    assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_sequential_ids_strictly_increase() -> Result<()> {
    // ---
    init_logging();

    let transport = RecordingTransport::new(math_dispatcher());
    let client = RpcClient::new(transport.clone());

    for i in 0..5 {
        let _: AddResponse = client.call("add", AddRequest { a: i, b: i }).await?;
    }

    let ids: Vec<i64> = transport
        .request_ids()
        .into_iter()
        .map(|id| match id {
            RequestId::Number(n) => n,
            other => panic!("expected numeric id, got {other}"),
        })
        .collect();

    assert_eq!(ids.len(), 5);
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids not increasing: {ids:?}");

    client.shutdown().await
}

#[tokio::test]
async fn test_concurrent_calls() -> Result<()> {
    // ---
    init_logging();

    let client = RpcClient::new(MemoryTransport::create(sleepy_dispatcher()));

    let mut handles = Vec::new();
    for i in 0..10u64 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            // Later calls finish first.
            let ms = 50 - i * 5;
            let reply: u64 = client.call("sleep", ms).await?;
            Ok::<_, RpcError>((ms, reply))
        }));
    }

    for handle in handles {
        let (sent, reply) = within(Duration::from_secs(2), handle)
            .await
            .expect("task")?;
        assert_eq!(sent, reply);
    }
    assert_eq!(client.pending_count(), 0);

    client.shutdown().await
}

#[tokio::test]
async fn test_custom_server_error_reaches_caller() -> Result<()> {
    // ---
    init_logging();

    let dispatcher = math_dispatcher();
    dispatcher.register("reserve", |seats: u32| async move {
        if seats > 3 {
            return Err(RpcError::server_with_data(
                -32050,
                "quota exceeded",
                json!({ "limit": 3 }),
            ));
        }
        Ok(seats)
    })?;

    let client = RpcClient::new(MemoryTransport::create(dispatcher));

    let ok: u32 = client.call("reserve", 2u32).await?;
    assert_eq!(ok, 2);

    let err = client.call::<_, u32>("reserve", 9u32).await.unwrap_err();
    match err {
        RpcError::Remote {
            code,
            message,
            data,
            ..
        } => {
            assert_eq!(code, -32050);
            assert_eq!(message, "quota exceeded");
            assert_eq!(data, Some(json!({ "limit": 3 })));
        }
        other => panic!("unexpected {other:?}"),
    }

    client.shutdown().await
}

#[tokio::test]
async fn test_server_rejects_bad_params_with_violations() -> Result<()> {
    // ---
    init_logging();

    let client = RpcClient::new(MemoryTransport::create(math_dispatcher()));

    let err = client
        .call_value(
            "add",
            Some(json!({ "a": "one", "b": 2 })),
            CallOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), -32606);
    match err {
        RpcError::Remote { data, .. } => assert!(data.is_some()),
        other => panic!("unexpected {other:?}"),
    }

    client.shutdown().await
}
