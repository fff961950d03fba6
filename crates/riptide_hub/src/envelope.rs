//! Message envelope and outbound frame types.
//!
//! Every message that crosses the hub is an [`Envelope`]: an event name plus
//! a JSON payload, optionally excluding one connection from broadcast
//! delivery. Outbound delivery is modeled as explicit frames on a
//! per-connection queue, so protocol differences (WebSocket text frames vs
//! SSE event blocks) stay out of the fan-out logic.

use crate::connection::ConnectionId;
use serde::{Deserialize, Serialize};

/// A message envelope: event name, payload, and an optional connection to
/// exclude when the envelope is broadcast to a room.
///
/// Wire shape is `{"event": "...", "data": ...}`; the exclusion is local
/// routing state and never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Operation or event name, used to select the registered handler.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Connection to skip during broadcast (typically the sender).
    #[serde(skip)]
    pub exclude: Option<ConnectionId>,
}

impl Envelope {
    /// Creates an envelope for `event` carrying `data`.
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
            exclude: None,
        }
    }

    /// Marks one connection to be skipped when this envelope is broadcast.
    pub fn excluding(mut self, id: ConnectionId) -> Self {
        self.exclude = Some(id);
        self
    }
}

/// One frame on a connection's outbound queue.
///
/// The per-connection writer task drains these in order, which is what
/// preserves per-connection delivery order across broadcasts.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    /// A text payload (an encoded envelope, for WebSocket connections).
    Text(String),
    /// A binary payload.
    Binary(Vec<u8>),
    /// An SSE event block: `event:` name plus `data:` body.
    Event { name: String, data: String },
    /// WebSocket pong answering a client ping.
    Pong(Vec<u8>),
    /// Orderly close; the writer shuts the transport down after sending.
    Close,
}
