//! # Riptide Server - Socket-Level Web Server Core
//!
//! The socket layer of the Riptide web server: accepts raw TCP connections,
//! parses HTTP/1.1 requests, dispatches them through the
//! [`riptide_router`] table, and hands upgraded connections (WebSocket and
//! SSE) over to the [`riptide_hub`] broadcast engine.
//!
//! ## Architecture Overview
//!
//! * **Accept loops** - one per listening socket, optionally one per CPU
//!   core with SO_REUSEPORT. Each accepted connection gets its own task.
//! * **Session state machine** - every connection runs
//!   `Accepted -> Reading -> Dispatching -> Responding -> Idle` and loops on
//!   keep-alive, or takes the one-way `Upgraded` transition into the hub.
//! * **Single fault boundary** - handler errors and panics are intercepted
//!   between "invoke handler" and "emit response"; one faulting handler
//!   never affects another connection.
//! * **Cancellation everywhere** - the server owns a root cancellation
//!   token; every connection and every in-flight request carries a child.
//!   Client disconnects and server shutdown unwind handlers and purge room
//!   memberships promptly.
//!
//! ## Request Flow
//!
//! 1. The accept loop hands the TCP stream to a fresh [`Session`]
//! 2. The session reads and parses one request
//! 3. Upgrade requests matching a registered WebSocket/SSE endpoint leave
//!    the HTTP cycle and attach to the hub
//! 4. Plain requests dispatch through the frozen route table; the result
//!    renderer produces the response
//! 5. The response is written and the session loops (keep-alive) or closes
//!
//! ## Error Handling
//!
//! Failures are scoped by type: [`SessionError`] is fatal to one connection
//! only; [`ServerError`] prevents startup. Malformed input never crashes
//! the process, and a failed send to one room member never aborts delivery
//! to the rest.

pub use config::ServerConfig;
pub use error::{ServerError, SessionError};
pub use server::{RiptideServer, ServerBuilder, ServerStats};
pub use session::{PendingUpgrade, Session, SessionOutcome, SessionState};

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod server;
pub mod session;
pub mod shutdown;

mod upgrade;
