//! Long-lived connection representation and lifecycle state.
//!
//! A connection is created on protocol upgrade, owned by the hub for its
//! whole life, and destroyed exactly once on disconnect regardless of how
//! many triggers race (peer reset, write failure, explicit close, server
//! shutdown).

use crate::envelope::OutboundFrame;
use riptide_router::{Identity, PathParams};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Opaque identifier for a long-lived connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Generates a fresh connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Protocol a connection was upgraded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    /// Bidirectional WebSocket session.
    WebSocket,
    /// Unidirectional Server-Sent-Events stream.
    Sse,
}

/// Why a connection left the hub.
#[derive(Debug, Clone)]
pub enum DisconnectReason {
    /// The peer closed the connection.
    ClientClosed,
    /// Sending or receiving on the transport failed.
    TransportError(String),
    /// The server is shutting down.
    ServerShutdown,
    /// The connection's outbound queue was found closed during delivery.
    QueueClosed,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ClientClosed => f.write_str("client closed"),
            DisconnectReason::TransportError(err) => write!(f, "transport error: {err}"),
            DisconnectReason::ServerShutdown => f.write_str("server shutdown"),
            DisconnectReason::QueueClosed => f.write_str("outbound queue closed"),
        }
    }
}

/// Connection metadata handed to callbacks and message handlers.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// The connection's id.
    pub id: ConnectionId,
    /// Peer address.
    pub remote_addr: SocketAddr,
    /// Upgraded protocol.
    pub kind: ProtocolKind,
    /// Path parameters captured by the upgrade route template.
    pub params: PathParams,
    /// Identity attached to the upgrade request, if any.
    pub identity: Option<Identity>,
}

/// Pub/sub lifetime states:
/// `Connected -> Disconnecting -> Disconnected`.
const STATE_CONNECTED: u8 = 0;
const STATE_DISCONNECTING: u8 = 1;
const STATE_DISCONNECTED: u8 = 2;

/// Hub-internal handle for one registered connection.
#[derive(Debug)]
pub(crate) struct ConnectionHandle {
    pub(crate) ctx: ConnectionContext,
    pub(crate) outbound: mpsc::UnboundedSender<OutboundFrame>,
    pub(crate) cancel: CancellationToken,
    state: AtomicU8,
}

impl ConnectionHandle {
    pub(crate) fn new(
        ctx: ConnectionContext,
        outbound: mpsc::UnboundedSender<OutboundFrame>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            outbound,
            cancel,
            state: AtomicU8::new(STATE_CONNECTED),
        }
    }

    /// Claims the disconnect transition. Only the first caller wins; every
    /// later trigger is a safe no-op, which is what makes teardown
    /// idempotent under racing close paths.
    pub(crate) fn begin_disconnect(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_CONNECTED,
                STATE_DISCONNECTING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Marks teardown complete.
    pub(crate) fn finish_disconnect(&self) {
        self.state.store(STATE_DISCONNECTED, Ordering::Release);
    }
}
