//! # Riptide Hub - Rooms and Broadcast Fan-Out
//!
//! The real-time half of the Riptide web server: tracks long-lived
//! WebSocket and SSE connections, groups them into named broadcast rooms,
//! and fans messages out with per-connection ordering and clean teardown
//! under concurrent load.
//!
//! ## Architecture
//!
//! * **One outbound queue per connection** - every delivery is an enqueue
//!   onto an unbounded per-connection channel drained by that connection's
//!   writer task. Fan-out never blocks on a slow peer, and frames for one
//!   connection are observed in the order they were issued.
//! * **One event-dispatch table per server instance** - inbound envelopes
//!   carry an event name that selects a handler registered at startup. No
//!   implicit shared callback state.
//! * **Lock-free membership** - connections, rooms, and the reverse
//!   membership index live in [`dashmap::DashMap`]s; no hub operation holds
//!   a cross-connection lock across a suspension point (none of them
//!   suspend at all).
//!
//! ## Lifecycle
//!
//! Connections register on protocol upgrade and are destroyed exactly once
//! on disconnect, no matter how many triggers race. Rooms are created
//! lazily on first join and pruned when the last member leaves.

pub use codec::{EnvelopeCodec, JsonEnvelopeCodec};
pub use connection::{
    ConnectionContext, ConnectionId, DisconnectReason, ProtocolKind,
};
pub use envelope::{Envelope, OutboundFrame};
pub use error::{CodecError, HubError};
pub use events::MessageHandler;
pub use hub::{Hub, HubBuilder, HubStats};

pub mod codec;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod events;
pub mod hub;
