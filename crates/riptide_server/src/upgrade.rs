//! Post-upgrade connection pumps.
//!
//! Once a session hands its transport over, each connection gets a writer
//! task draining its hub queue and (for WebSocket) a read loop feeding
//! inbound envelopes to the hub's dispatch table. Every exit path funnels
//! through `Hub::disconnect`, which is idempotent, so racing failures on the
//! two pumps cannot double-tear-down a connection.

use crate::session::PendingUpgrade;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use riptide_hub::{
    ConnectionContext, ConnectionId, DisconnectReason, Hub, OutboundFrame, ProtocolKind,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::tungstenite::protocol::{Message, Role};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Attaches an upgraded WebSocket connection to the hub and pumps it until
/// disconnect.
pub(crate) async fn serve_websocket<T>(
    pending: PendingUpgrade<T>,
    hub: Arc<Hub>,
    cancel: CancellationToken,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = ConnectionId::new();
    let ctx = ConnectionContext {
        id,
        remote_addr: pending.remote_addr,
        kind: ProtocolKind::WebSocket,
        params: pending.params,
        identity: pending.identity,
    };
    let rx = hub.register(ctx, cancel.clone());

    // The handshake already happened in the session; wrap the raw transport
    // directly in the server role.
    let ws = WebSocketStream::from_raw_socket(pending.transport, Role::Server, None).await;
    let (sink, stream) = ws.split();

    let writer = tokio::spawn(write_pump(hub.clone(), id, sink, rx));
    let reason = read_pump(&hub, id, stream, cancel).await;
    hub.disconnect(id, reason);

    // Disconnect dropped the queue sender, which ends the writer.
    let _ = writer.await;
}

/// Drains the outbound queue into the WebSocket sink. Ends when the queue
/// closes (disconnect) or a write fails.
async fn write_pump<T>(
    hub: Arc<Hub>,
    id: ConnectionId,
    mut sink: SplitSink<WebSocketStream<T>, Message>,
    mut rx: UnboundedReceiver<OutboundFrame>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    while let Some(frame) = rx.recv().await {
        let message = match frame {
            OutboundFrame::Text(text) => Message::text(text),
            OutboundFrame::Binary(data) => Message::binary(data),
            OutboundFrame::Pong(data) => Message::Pong(data.into()),
            OutboundFrame::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            // SSE framing never reaches a websocket queue.
            OutboundFrame::Event { .. } => continue,
        };
        if let Err(err) = sink.send(message).await {
            hub.disconnect(id, DisconnectReason::TransportError(err.to_string()));
            break;
        }
    }
    let _ = sink.close().await;
}

/// Feeds inbound frames to the hub until the peer leaves, the transport
/// fails, or the connection is cancelled.
async fn read_pump<T>(
    hub: &Arc<Hub>,
    id: ConnectionId,
    mut stream: SplitStream<WebSocketStream<T>>,
    cancel: CancellationToken,
) -> DisconnectReason
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => return DisconnectReason::ServerShutdown,
            message = stream.next() => message,
        };

        match message {
            None => return DisconnectReason::ClientClosed,
            Some(Ok(Message::Text(text))) => {
                if let Err(err) = hub.dispatch_inbound(id, text.as_str()).await {
                    warn!("inbound message from {} rejected: {}", id, err);
                }
            }
            Some(Ok(Message::Ping(payload))) => {
                let _ = hub.deliver(id, OutboundFrame::Pong(payload.to_vec()));
            }
            Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) => return DisconnectReason::ClientClosed,
            Some(Ok(other)) => {
                debug!("ignoring unsupported frame from {}: {:?}", id, other);
            }
            Some(Err(err)) => return DisconnectReason::TransportError(err.to_string()),
        }
    }
}

/// Attaches an upgraded SSE connection to the hub and streams its queue
/// until disconnect. SSE is unidirectional: the read side is watched only
/// to notice the peer going away.
pub(crate) async fn serve_sse<T>(
    pending: PendingUpgrade<T>,
    hub: Arc<Hub>,
    cancel: CancellationToken,
    ping_interval: Duration,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = ConnectionId::new();
    let ctx = ConnectionContext {
        id,
        remote_addr: pending.remote_addr,
        kind: ProtocolKind::Sse,
        params: pending.params,
        identity: pending.identity,
    };
    let mut rx = hub.register(ctx, cancel.clone());

    let (mut read_half, mut write_half) = tokio::io::split(pending.transport);
    let mut ping = tokio::time::interval(ping_interval);
    let mut scratch = [0u8; 512];

    let reason = loop {
        tokio::select! {
            _ = cancel.cancelled() => break DisconnectReason::ServerShutdown,
            frame = rx.recv() => match frame {
                None => break DisconnectReason::QueueClosed,
                Some(OutboundFrame::Event { name, data }) => {
                    if let Err(err) = crate::http::write_sse_frame(&mut write_half, &name, &data).await {
                        break DisconnectReason::TransportError(err.to_string());
                    }
                }
                Some(OutboundFrame::Close) => break DisconnectReason::ServerShutdown,
                Some(other) => {
                    debug!("ignoring non-event frame on sse connection {}: {:?}", id, other);
                }
            },
            _ = ping.tick() => {
                if let Err(err) = write_half.write_all(b": ping\n\n").await {
                    break DisconnectReason::TransportError(err.to_string());
                }
                let _ = write_half.flush().await;
            }
            read = read_half.read(&mut scratch) => match read {
                Ok(0) => break DisconnectReason::ClientClosed,
                // SSE clients have nothing to say; drain and ignore.
                Ok(_) => {}
                Err(err) => break DisconnectReason::TransportError(err.to_string()),
            },
        }
    };

    hub.disconnect(id, reason);
    let _ = write_half.shutdown().await;
}
