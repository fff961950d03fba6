//! The hub: room membership and broadcast fan-out for long-lived
//! connections.
//!
//! Connections register on protocol upgrade and are destroyed exactly once
//! on disconnect. Rooms are created lazily on first join and pruned when the
//! last member leaves. All membership state lives in concurrency-safe maps;
//! no hub operation suspends, so nothing ever holds a cross-connection lock
//! across an await point.

use crate::codec::{EnvelopeCodec, JsonEnvelopeCodec};
use crate::connection::{
    ConnectionContext, ConnectionHandle, ConnectionId, DisconnectReason, ProtocolKind,
};
use crate::envelope::{Envelope, OutboundFrame};
use crate::error::HubError;
use crate::events::{ConnectCallback, DisconnectCallback, FnMessageHandler, MessageHandler};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Counters kept by the hub for logging and operational introspection.
#[derive(Debug, Default)]
struct HubCounters {
    opened: AtomicU64,
    closed: AtomicU64,
    broadcasts: AtomicU64,
    frames_enqueued: AtomicU64,
}

/// Point-in-time view of hub statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubStats {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub broadcasts: u64,
    pub frames_enqueued: u64,
    pub active_connections: usize,
    pub active_rooms: usize,
}

/// Tracks long-lived connections grouped into named broadcast rooms.
///
/// Owned by one server instance; there are no process-wide singletons. The
/// dispatch table and lifecycle callbacks are frozen at construction, the
/// connection and room maps are the hot mutable state.
pub struct Hub {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    rooms: DashMap<String, HashSet<ConnectionId>>,
    memberships: DashMap<ConnectionId, HashSet<String>>,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    on_connect: Option<ConnectCallback>,
    on_disconnect: Option<DisconnectCallback>,
    codec: Arc<dyn EnvelopeCodec>,
    counters: HubCounters,
}

impl Hub {
    /// Starts building a hub.
    pub fn builder() -> HubBuilder {
        HubBuilder::new()
    }

    /// Registers a freshly upgraded connection.
    ///
    /// Creates the connection's outbound queue, stores the handle, and fires
    /// the `on_connect` callback before returning, so by the time the caller
    /// spawns the connection's pump tasks the connection is fully visible to
    /// the rest of the hub. Returns the receiving end of the outbound queue
    /// for the caller's writer task to drain.
    pub fn register(
        self: &Arc<Self>,
        ctx: ConnectionContext,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<OutboundFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ctx.id;
        let handle = Arc::new(ConnectionHandle::new(ctx, tx, cancel));
        self.connections.insert(id, handle.clone());
        self.counters.opened.fetch_add(1, Ordering::Relaxed);
        debug!("connection {} registered ({:?})", id, handle.ctx.kind);

        if let Some(callback) = &self.on_connect {
            callback(self.clone(), &handle.ctx);
        }
        rx
    }

    /// Adds a connection to a room. Idempotent: joining a room twice is a
    /// no-op success. The room is created lazily on first join.
    pub fn join(&self, room: &str, id: ConnectionId) -> Result<(), HubError> {
        if !self.connections.contains_key(&id) {
            return Err(HubError::UnknownConnection(id));
        }

        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(id);
        self.memberships
            .entry(id)
            .or_default()
            .insert(room.to_string());

        // A disconnect may have purged the connection between the check
        // above and the inserts; undo so no membership dangles.
        if !self.connections.contains_key(&id) {
            self.leave(room, id);
            return Err(HubError::UnknownConnection(id));
        }
        Ok(())
    }

    /// Removes a connection from a room. Idempotent; unknown rooms and
    /// non-members are no-ops. An emptied room is pruned.
    pub fn leave(&self, room: &str, id: ConnectionId) {
        if let Some(mut rooms) = self.memberships.get_mut(&id) {
            rooms.remove(room);
        }
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    /// Broadcasts an envelope to every current member of a room.
    ///
    /// Takes an atomic snapshot of the membership (minus the envelope's
    /// excluded connection, if any) and enqueues the encoded message for
    /// each member. Connections joining after the snapshot do not receive
    /// this broadcast. A failed enqueue triggers that one connection's
    /// disconnect path and never aborts delivery to its siblings.
    ///
    /// Returns the number of connections the message was enqueued for.
    pub fn broadcast(self: &Arc<Self>, room: &str, envelope: &Envelope) -> Result<usize, HubError> {
        let snapshot: Vec<ConnectionId> = match self.rooms.get(room) {
            Some(members) => members.iter().copied().collect(),
            None => return Ok(0),
        };

        let encoded = self.codec.encode(envelope)?;
        let sse_data = serde_json::to_string(&envelope.data)
            .unwrap_or_else(|_| "null".to_string());

        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        for id in snapshot {
            if envelope.exclude == Some(id) {
                continue;
            }
            let frame = match self.kind_of(id) {
                Some(ProtocolKind::Sse) => OutboundFrame::Event {
                    name: envelope.event.clone(),
                    data: sse_data.clone(),
                },
                Some(ProtocolKind::WebSocket) => OutboundFrame::Text(encoded.clone()),
                // Already gone; the disconnect purge races harmlessly with
                // our snapshot.
                None => continue,
            };
            match self.deliver(id, frame) {
                Ok(()) => delivered += 1,
                Err(err) => debug!("broadcast delivery to {} skipped: {}", id, err),
            }
        }
        Ok(delivered)
    }

    /// Sends an envelope to one connection, encoded for its protocol.
    pub fn send(self: &Arc<Self>, id: ConnectionId, envelope: &Envelope) -> Result<(), HubError> {
        let frame = match self.kind_of(id) {
            Some(ProtocolKind::Sse) => OutboundFrame::Event {
                name: envelope.event.clone(),
                data: serde_json::to_string(&envelope.data)
                    .unwrap_or_else(|_| "null".to_string()),
            },
            Some(ProtocolKind::WebSocket) => OutboundFrame::Text(self.codec.encode(envelope)?),
            None => return Err(HubError::UnknownConnection(id)),
        };
        self.deliver(id, frame)
    }

    /// Enqueues a raw frame for one connection. Lower level than [`Hub::send`];
    /// used by the connection pumps for protocol frames (pongs, closes) that
    /// never pass through the envelope codec.
    pub fn deliver(
        self: &Arc<Self>,
        id: ConnectionId,
        frame: OutboundFrame,
    ) -> Result<(), HubError> {
        let handle = match self.connections.get(&id) {
            Some(entry) => entry.value().clone(),
            None => return Err(HubError::UnknownConnection(id)),
        };

        if handle.outbound.send(frame).is_err() {
            // The writer task is gone; route this connection through the
            // normal disconnect path without failing the caller's loop.
            self.disconnect(id, DisconnectReason::QueueClosed);
            return Err(HubError::ConnectionClosed(id));
        }
        self.counters.frames_enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Tears a connection down: purges it from every room it belonged to,
    /// cancels its session token, removes the handle, and fires the
    /// `on_disconnect` callback.
    ///
    /// Safe to invoke from any number of racing triggers (peer reset, write
    /// failure, explicit close, server shutdown); only the first caller
    /// performs teardown and the callback fires exactly once. Returns
    /// whether this call performed the teardown.
    pub fn disconnect(self: &Arc<Self>, id: ConnectionId, reason: DisconnectReason) -> bool {
        let handle = match self.connections.get(&id) {
            Some(entry) => entry.value().clone(),
            None => return false,
        };
        if !handle.begin_disconnect() {
            return false;
        }

        if let Some((_, rooms)) = self.memberships.remove(&id) {
            for room in rooms {
                if let Some(mut members) = self.rooms.get_mut(&room) {
                    members.remove(&id);
                }
                self.rooms.remove_if(&room, |_, members| members.is_empty());
            }
        }

        self.connections.remove(&id);
        handle.cancel.cancel();
        handle.finish_disconnect();
        self.counters.closed.fetch_add(1, Ordering::Relaxed);
        debug!("connection {} disconnected: {}", id, reason);

        if let Some(callback) = &self.on_disconnect {
            callback(self.clone(), &handle.ctx, &reason);
        }
        true
    }

    /// Decodes an inbound text frame and routes it to the handler registered
    /// for its event name.
    pub async fn dispatch_inbound(
        self: &Arc<Self>,
        id: ConnectionId,
        raw: &str,
    ) -> Result<(), HubError> {
        let envelope = self.codec.decode(raw)?;
        let ctx = self
            .context(id)
            .ok_or(HubError::UnknownConnection(id))?;

        let handler = self
            .handlers
            .get(&envelope.event)
            .cloned()
            .ok_or_else(|| HubError::UnknownEvent(envelope.event.clone()))?;

        debug!("dispatching '{}' from connection {}", envelope.event, id);
        handler.handle(self.clone(), ctx, envelope).await
    }

    /// Sends a close frame to every connection and tears them all down.
    /// Used on server shutdown.
    pub fn shutdown(self: &Arc<Self>) {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            let _ = self.deliver(id, OutboundFrame::Close);
            self.disconnect(id, DisconnectReason::ServerShutdown);
        }
    }

    /// Context of a registered connection.
    pub fn context(&self, id: ConnectionId) -> Option<ConnectionContext> {
        self.connections.get(&id).map(|entry| entry.ctx.clone())
    }

    fn kind_of(&self, id: ConnectionId) -> Option<ProtocolKind> {
        self.connections.get(&id).map(|entry| entry.ctx.kind)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Current member count of a room (0 if the room does not exist).
    pub fn room_members(&self, room: &str) -> usize {
        self.rooms.get(room).map(|members| members.len()).unwrap_or(0)
    }

    /// Whether a connection is currently a member of a room.
    pub fn is_member(&self, room: &str, id: ConnectionId) -> bool {
        self.rooms
            .get(room)
            .map(|members| members.contains(&id))
            .unwrap_or(false)
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> HubStats {
        HubStats {
            connections_opened: self.counters.opened.load(Ordering::Relaxed),
            connections_closed: self.counters.closed.load(Ordering::Relaxed),
            broadcasts: self.counters.broadcasts.load(Ordering::Relaxed),
            frames_enqueued: self.counters.frames_enqueued.load(Ordering::Relaxed),
            active_connections: self.connections.len(),
            active_rooms: self.rooms.len(),
        }
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("connections", &self.connections.len())
            .field("rooms", &self.rooms.len())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Builds a [`Hub`] with its callbacks, dispatch table, and codec. All of
/// these are frozen once `build` is called.
pub struct HubBuilder {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    on_connect: Option<ConnectCallback>,
    on_disconnect: Option<DisconnectCallback>,
    codec: Arc<dyn EnvelopeCodec>,
}

impl HubBuilder {
    /// A builder with the JSON codec and no callbacks.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            on_connect: None,
            on_disconnect: None,
            codec: Arc::new(JsonEnvelopeCodec),
        }
    }

    /// Sets the connect callback.
    pub fn on_connect<F>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Hub>, &ConnectionContext) + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(callback));
        self
    }

    /// Sets the disconnect callback.
    pub fn on_disconnect<F>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Hub>, &ConnectionContext, &DisconnectReason) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(callback));
        self
    }

    /// Registers a message handler for one event name. A later registration
    /// under the same name replaces the earlier one.
    pub fn on_message<F, Fut>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<Hub>, ConnectionContext, Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HubError>> + Send + 'static,
    {
        self.handlers
            .insert(event.into(), Arc::new(FnMessageHandler::new(handler)));
        self
    }

    /// Registers a [`MessageHandler`] implementation for one event name.
    pub fn handler(mut self, event: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.insert(event.into(), handler);
        self
    }

    /// Replaces the envelope codec.
    pub fn codec(mut self, codec: Arc<dyn EnvelopeCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Freezes the configuration into a shareable hub.
    pub fn build(self) -> Arc<Hub> {
        Arc::new(Hub {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            handlers: self.handlers,
            on_connect: self.on_connect,
            on_disconnect: self.on_disconnect,
            codec: self.codec,
            counters: HubCounters::default(),
        })
    }
}

impl Default for HubBuilder {
    fn default() -> Self {
        Self::new()
    }
}
