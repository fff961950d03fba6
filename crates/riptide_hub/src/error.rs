//! Error types for hub operations and envelope coding.

use crate::connection::ConnectionId;
use thiserror::Error;

/// Envelope encode/decode failure.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("envelope encode failed: {0}")]
    Encode(String),

    #[error("envelope decode failed: {0}")]
    Decode(String),
}

/// Errors that can occur during hub operations.
///
/// None of these are fatal to the hub itself; the worst outcome any of them
/// triggers is the disconnect path of a single connection.
#[derive(Debug, Error)]
pub enum HubError {
    /// The connection id is not (or no longer) registered.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The connection's outbound queue is gone; its writer has shut down.
    #[error("connection closed: {0}")]
    ConnectionClosed(ConnectionId),

    /// An inbound envelope named an event with no registered handler.
    #[error("no handler registered for event '{0}'")]
    UnknownEvent(String),

    /// Envelope coding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A message handler reported a failure.
    #[error("message handler failed: {0}")]
    Handler(String),
}
