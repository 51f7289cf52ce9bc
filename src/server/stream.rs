//! Line-delimited server side of the stream transport.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::Dispatcher;
use crate::transport::stream::framing::{frame_outgoing, LineFramer};
use crate::{Result, RpcError};

const READ_CHUNK: usize = 8 * 1024;

/// Serve one connection until the peer closes it.
///
/// Lines are dispatched strictly in arrival order and each reply is written
/// before the next line is handled, so replies leave in request order.
pub async fn serve_connection<S>(io: S, dispatcher: Arc<Dispatcher>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    // ---
    let (mut reader, mut writer) = tokio::io::split(io);
    let mut framer = LineFramer::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(|err| RpcError::Transport(format!("read failed: {err}")))?;

        if n == 0 {
            if framer.pending_len() > 0 {
                crate::log_debug!(
                    "peer closed with {} unterminated bytes",
                    framer.pending_len()
                );
            }
            return Ok(());
        }

        for line in framer.push(&chunk[..n])? {
            let Some(reply) = dispatcher.handle_text(&line).await else {
                continue;
            };

            let framed = frame_outgoing(&reply)?;
            writer
                .write_all(framed.as_bytes())
                .await
                .map_err(|err| RpcError::Transport(format!("write failed: {err}")))?;
        }
        writer
            .flush()
            .await
            .map_err(|err| RpcError::Transport(format!("flush failed: {err}")))?;
    }
}

/// Accept connections on `listener` and serve each on its own task.
///
/// The returned handle runs until aborted or the listener fails.
pub fn spawn_tcp_server(listener: TcpListener, dispatcher: Arc<Dispatcher>) -> JoinHandle<()> {
    // ---
    tokio::spawn(async move {
        if let Ok(_addr) = listener.local_addr() {
            crate::log_info!("stream server listening on {_addr}");
        }

        loop {
            let (socket, _peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_err) => {
                    crate::log_error!("accept failed: {_err}");
                    return;
                }
            };

            crate::log_debug!("accepted connection from {_peer}");
            let dispatcher = dispatcher.clone();

            tokio::spawn(async move {
                if let Err(_err) = serve_connection(socket, dispatcher).await {
                    crate::log_warn!("connection from {_peer} ended: {_err}");
                }
            });
        }
    })
}
