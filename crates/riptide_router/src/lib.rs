//! # Riptide Router - Template Path Matching and Dispatch
//!
//! The routing core of the Riptide web server: route templates are compiled
//! once at startup into matchable patterns, frozen into an immutable table,
//! and dispatched against with deterministic specificity ranking.
//!
//! ## Design Philosophy
//!
//! * **Explicit registration** - routes are registered by calls executed once
//!   at startup, producing an immutable table. No attribute scanning, no
//!   reflection; metadata discovery belongs in optional adapters above the
//!   core.
//! * **Plain handler functions** - handlers are async functions/closures over
//!   an explicit [`RequestContext`]. Shared behavior composes around them;
//!   there is no controller hierarchy to inherit from.
//! * **Results, not exceptions** - matching and dispatch outcomes are typed
//!   values ([`DispatchError`], [`RegisterError`], [`CompileError`]) so the
//!   dispatch logic stays branch-free and testable.
//!
//! ## Template Syntax
//!
//! * `/user/admin` - literal segments, matched case-sensitively
//! * `/user/:id` - `:name` captures exactly one non-empty segment
//! * `/files/:path*` - `:name*` captures the remainder (zero or more
//!   segments); a bare trailing `*` captures under the name `"*"`. Wildcards
//!   are only valid as the final segment.
//!
//! ## Dispatch Ranking
//!
//! Among routes matching both path and method the highest specificity score
//! wins (literal > parameter > wildcard, summed per segment); equal scores
//! fall back to registration order, first wins. Both rules are covered by
//! unit tests rather than re-derived by callers.

pub use error::{CompileError, DispatchError, HandlerError, RegisterError};
pub use handler::{
    handler, DispatchResult, Handler, Identity, IdentityProvider, JsonErrorRenderer,
    RequestContext, ResultRenderer,
};
pub use method::Method;
pub use pattern::{CompiledPattern, PathParams, Segment};
pub use request::{Request, Version};
pub use response::{Response, Status};
pub use route::{Route, RouteInfo};
pub use router::{RouteMatch, Router};

pub mod error;
pub mod handler;
pub mod method;
pub mod pattern;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
