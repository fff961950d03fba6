//! Server and session error types.
//!
//! The split mirrors the error taxonomy of the core: session errors are
//! scoped to one connection and never escalate past it; server errors are
//! startup/infrastructure failures that prevent serving at all.

use riptide_router::RegisterError;
use thiserror::Error;

/// Errors that can occur during server startup and operation.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Network-related failures (binding, listening, socket options).
    #[error("network error: {0}")]
    Network(String),

    /// Internal failures that should not occur in normal operation.
    #[error("internal error: {0}")]
    Internal(String),

    /// Route registration failed. Fatal before the listener binds.
    #[error(transparent)]
    Registration(#[from] RegisterError),
}

/// Errors terminating one connection's session. Always fatal to that one
/// connection, never to the server process.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The peer sent bytes that do not parse as an HTTP request or that
    /// violate configured limits. Client-class; answered with a 400 where
    /// the transport still permits one.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// I/O failure on the transport. Triggers disconnect and room purge.
    #[error("transport fault: {0}")]
    Transport(#[from] std::io::Error),
}
