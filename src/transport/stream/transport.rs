//! Stream transport implementation.
//!
//! ## Concurrency model
//!
//! - A single background **actor task** owns the TCP connection, the read
//!   buffer, the reconnect counter and the FIFO reply queue.
//! - The public handle talks to the actor through a command channel; no
//!   other task ever touches the socket.
//! - Incoming lines are published on the transport's message channel, and
//!   connection state changes on a separate [`ConnectionEvent`] channel.
//! - An unexpected disconnect is also announced, with its reason, on
//!   [`Transport::connection_lost`], which the client uses to reject the
//!   calls it still has in flight.
//!
//! ## Reconnection
//!
//! After a failed connect or an unexpected disconnect the actor waits
//! `attempt × reconnect_delay` and tries again. When the attempt cap is
//! exceeded it emits [`ConnectionEvent::MaxReconnectAttemptsReached`] and
//! stops for good. A successful connect resets the counter.
//!
//! While disconnected, sends fail immediately with
//! [`RpcError::NotConnected`]; only the actor waits out the back-off.
//!
//! ## Reply matching
//!
//! [`StreamTransport::request`] matches replies to requests by arrival
//! order on the connection, not by id. This holds only while the peer
//! answers in the order it received requests (as
//! [`serve_connection`](crate::serve_connection) does). Every waiter is
//! rejected with [`RpcError::ConnectionLost`] when the connection drops;
//! nothing survives a reconnect. The id-correlating [`RpcClient`](crate::RpcClient)
//! does not depend on this ordering.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::framing::{frame_outgoing, LineFramer};
use crate::event::lock_ignore_poison;
use crate::protocol::parse_as_response;
use crate::reconnect::Backoff;
use crate::{
    // ---
    EventChannel,
    Message,
    Request,
    Response,
    Result,
    RpcError,
    StreamConfig,
    Transport,
};

const READ_CHUNK: usize = 8 * 1024;
const COMMAND_QUEUE: usize = 64;

/// Connection lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    Reconnecting { attempt: u32, delay: Duration },
    MaxReconnectAttemptsReached,
}

/// Current state of the connection actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// First connect attempt in progress.
    Connecting,
    Connected,
    /// Waiting out the back-off before the next attempt.
    Reconnecting,
    /// Gave up after the maximum number of reconnect attempts.
    Failed,
    /// Closed by [`Transport::disconnect`].
    Closed,
}

impl ConnectionState {
    fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

type Waiter = oneshot::Sender<Result<String>>;

//
// Actor commands
//

enum Cmd {
    // ---
    Send {
        text: String,
        resp: oneshot::Sender<Result<()>>,
    },
    Request {
        text: String,
        resp: Waiter,
    },
    Close {
        resp: oneshot::Sender<Result<()>>,
    },
}

enum ActorStep {
    // ---
    Continue,
    Lost(String),
    Stop,
}

impl Cmd {
    // ---

    /// Runs a command against a live connection.
    async fn handle(self, actor: &mut StreamActor, writer: &mut OwnedWriteHalf) -> ActorStep {
        // ---
        match self {
            Cmd::Send { text, resp } => match write_line(writer, &text).await {
                Ok(()) => {
                    let _ = resp.send(Ok(()));
                    ActorStep::Continue
                }
                Err(reason) => {
                    let _ = resp.send(Err(RpcError::ConnectionLost(reason.clone())));
                    ActorStep::Lost(reason)
                }
            },
            Cmd::Request { text, resp } => match write_line(writer, &text).await {
                Ok(()) => {
                    actor.waiters.push_back(resp);
                    ActorStep::Continue
                }
                Err(reason) => {
                    let _ = resp.send(Err(RpcError::ConnectionLost(reason.clone())));
                    ActorStep::Lost(reason)
                }
            },
            Cmd::Close { resp } => {
                let _ = writer.shutdown().await;
                let _ = resp.send(Ok(()));
                ActorStep::Stop
            }
        }
    }

    /// Answers a command while no connection is up.
    fn reject(self) -> ActorStep {
        // ---
        match self {
            Cmd::Send { resp, .. } => {
                let _ = resp.send(Err(RpcError::NotConnected));
                ActorStep::Continue
            }
            Cmd::Request { resp, .. } => {
                let _ = resp.send(Err(RpcError::NotConnected));
                ActorStep::Continue
            }
            Cmd::Close { resp } => {
                let _ = resp.send(Ok(()));
                ActorStep::Stop
            }
        }
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, text: &str) -> std::result::Result<(), String> {
    // ---
    writer
        .write_all(text.as_bytes())
        .await
        .map_err(|err| format!("write failed: {err}"))?;
    writer
        .flush()
        .await
        .map_err(|err| format!("flush failed: {err}"))
}

/// Newline-delimited JSON over one long-lived TCP connection.
pub struct StreamTransport {
    // ---
    max_attempts: u32,
    cmd_tx: mpsc::Sender<Cmd>,
    messages: Arc<EventChannel<String>>,
    events: Arc<EventChannel<ConnectionEvent>>,
    lost: Arc<EventChannel<String>>,
    state: watch::Receiver<ConnectionState>,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl StreamTransport {
    // ---

    /// Start the connection actor without waiting for the first connect.
    ///
    /// Subscribe to [`events`](Self::events) right away to observe every
    /// state change.
    pub fn spawn(config: StreamConfig) -> Self {
        // ---
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let messages = Arc::new(EventChannel::new());
        let events = Arc::new(EventChannel::new());
        let lost = Arc::new(EventChannel::new());

        let max_attempts = config.reconnect.max_attempts;

        let actor = StreamActor {
            backoff: Backoff::new(config.reconnect),
            config,
            cmd_rx,
            messages: Arc::clone(&messages),
            events: Arc::clone(&events),
            lost: Arc::clone(&lost),
            state_tx,
            waiters: VecDeque::new(),
        };
        let handle = tokio::spawn(actor.run());

        Self {
            max_attempts,
            cmd_tx,
            messages,
            events,
            lost,
            state: state_rx,
            actor: Mutex::new(Some(handle)),
        }
    }

    /// Start the actor and wait until the first connection is up.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::MaxReconnectAttempts`] if every attempt failed.
    pub async fn connect(config: StreamConfig) -> Result<Self> {
        // ---
        let transport = Self::spawn(config);
        transport.wait_connected().await?;
        Ok(transport)
    }

    /// Wait until the connection is up, or fail once the actor has stopped.
    pub async fn wait_connected(&self) -> Result<()> {
        // ---
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| *s == ConnectionState::Connected || s.is_terminal())
            .await
            .map(|s| *s)
            .unwrap_or(ConnectionState::Closed);

        match reached {
            ConnectionState::Connected => Ok(()),
            other => Err(self.stopped_error(other)),
        }
    }

    /// Send a request and wait for the next reply on this connection.
    ///
    /// Replies are matched in arrival order (see the module docs).
    pub async fn request(&self, request: &Request) -> Result<Response> {
        // ---
        let text = frame_outgoing(&Message::Request(request.clone()).encode()?)?;
        let (resp, rx) = oneshot::channel();

        self.command(Cmd::Request { text, resp }).await?;
        let reply = rx.await.map_err(|_| self.closed_error())??;

        let value: Value =
            serde_json::from_str(&reply).map_err(|err| RpcError::Decode(err.to_string()))?;
        parse_as_response(&value).map_err(RpcError::InvalidMessage)
    }

    /// Connection lifecycle events.
    pub fn events(&self) -> &EventChannel<ConnectionEvent> {
        &self.events
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    async fn command(&self, cmd: Cmd) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| self.closed_error())
    }

    fn closed_error(&self) -> RpcError {
        self.stopped_error(self.state())
    }

    fn stopped_error(&self, state: ConnectionState) -> RpcError {
        match state {
            ConnectionState::Failed => RpcError::MaxReconnectAttempts(self.max_attempts),
            ConnectionState::Closed => RpcError::Transport("stream transport is closed".into()),
            _ => RpcError::NotConnected,
        }
    }
}

#[async_trait::async_trait]
impl Transport for StreamTransport {
    // ---
    async fn send(&self, message: &Message) -> Result<()> {
        // ---
        let text = frame_outgoing(&message.encode()?)?;
        let (resp, rx) = oneshot::channel();

        self.command(Cmd::Send { text, resp }).await?;
        rx.await.map_err(|_| self.closed_error())?
    }

    fn messages(&self) -> &EventChannel<String> {
        &self.messages
    }

    fn connection_lost(&self) -> Option<&EventChannel<String>> {
        Some(&self.lost)
    }

    async fn disconnect(&self) -> Result<()> {
        // ---
        let (resp, rx) = oneshot::channel();
        if self.cmd_tx.send(Cmd::Close { resp }).await.is_ok() {
            let _ = rx.await;
        }

        let handle = lock_ignore_poison(&self.actor).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        Ok(())
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        if let Some(handle) = lock_ignore_poison(&self.actor).take() {
            handle.abort();
        }
    }
}

struct StreamActor {
    // ---
    config: StreamConfig,
    cmd_rx: mpsc::Receiver<Cmd>,
    messages: Arc<EventChannel<String>>,
    events: Arc<EventChannel<ConnectionEvent>>,
    lost: Arc<EventChannel<String>>,
    state_tx: watch::Sender<ConnectionState>,
    backoff: Backoff,
    waiters: VecDeque<Waiter>,
}

impl StreamActor {
    // ---

    async fn run(mut self) {
        // ---
        loop {
            match self.try_connect().await {
                Ok(stream) => {
                    self.backoff.reset();
                    self.set_state(ConnectionState::Connected);
                    self.events.publish(ConnectionEvent::Connected);
                    crate::log_info!("{}: connected", self.config.address);

                    match self.serve(stream).await {
                        ActorStep::Stop => break,
                        ActorStep::Lost(reason) => {
                            crate::log_info!("{}: connection lost: {reason}", self.config.address);
                            self.fail_waiters(&reason);
                            self.lost.publish(reason);
                            self.events.publish(ConnectionEvent::Disconnected);
                        }
                        ActorStep::Continue => {}
                    }
                }
                Err(_err) => {
                    crate::log_warn!("{}: connect failed: {_err}", self.config.address);
                }
            }

            let Some((attempt, delay)) = self.backoff.next() else {
                crate::log_error!(
                    "{}: giving up after {} reconnect attempts",
                    self.config.address,
                    self.backoff.max_attempts()
                );
                self.events
                    .publish(ConnectionEvent::MaxReconnectAttemptsReached);
                self.shutdown(ConnectionState::Failed);
                return;
            };

            crate::log_info!(
                "{}: reconnect attempt {attempt} in {delay:?}",
                self.config.address
            );
            self.set_state(ConnectionState::Reconnecting);
            self.events
                .publish(ConnectionEvent::Reconnecting { attempt, delay });

            if matches!(self.back_off(delay).await, ActorStep::Stop) {
                break;
            }
        }

        self.events.publish(ConnectionEvent::Disconnected);
        self.shutdown(ConnectionState::Closed);
    }

    async fn try_connect(&self) -> std::result::Result<TcpStream, String> {
        // ---
        let connect = TcpStream::connect(self.config.address.as_str());
        match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                Ok(stream)
            }
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(format!(
                "timed out after {:?}",
                self.config.connect_timeout
            )),
        }
    }

    /// Pump commands and incoming bytes until the connection ends.
    async fn serve(&mut self, stream: TcpStream) -> ActorStep {
        // ---
        let (mut reader, mut writer) = stream.into_split();
        let mut framer = LineFramer::with_max_line(self.config.max_line_length);
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        return ActorStep::Stop;
                    };
                    match cmd.handle(self, &mut writer).await {
                        ActorStep::Continue => {}
                        step => return step,
                    }
                }

                read = reader.read(&mut chunk) => {
                    match read {
                        Ok(0) => return ActorStep::Lost("peer closed the connection".into()),
                        Ok(n) => match framer.push(&chunk[..n]) {
                            Ok(lines) => {
                                for line in lines {
                                    self.deliver(line);
                                }
                            }
                            Err(err) => return ActorStep::Lost(err.to_string()),
                        },
                        Err(err) => return ActorStep::Lost(format!("read failed: {err}")),
                    }
                }
            }
        }
    }

    /// Wait out a reconnect delay while still answering commands.
    async fn back_off(&mut self, delay: Duration) -> ActorStep {
        // ---
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return ActorStep::Continue,

                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        return ActorStep::Stop;
                    };
                    if matches!(cmd.reject(), ActorStep::Stop) {
                        return ActorStep::Stop;
                    }
                }
            }
        }
    }

    fn deliver(&mut self, line: String) {
        // ---
        // Only replies consume a FIFO waiter; peer-initiated calls do not.
        if !self.waiters.is_empty() && is_reply(&line) {
            if let Some(waiter) = self.waiters.pop_front() {
                let _ = waiter.send(Ok(line.clone()));
            }
        }
        self.messages.publish(line);
    }

    fn fail_waiters(&mut self, reason: &str) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(RpcError::ConnectionLost(reason.to_string())));
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }

    fn shutdown(&mut self, state: ConnectionState) {
        // ---
        self.fail_waiters("transport stopped");
        self.cmd_rx.close();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            let _ = cmd.reject();
        }
        self.set_state(state);
    }
}

fn is_reply(line: &str) -> bool {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(obj)) => !obj.contains_key("method"),
        _ => false,
    }
}
