//! Shared per-server dispatch state and the single handler-fault boundary.
//!
//! One `Dispatcher` exists per server instance. It owns the frozen route
//! table, the upgrade tables, the result renderer, and the identity
//! provider; sessions borrow it through an `Arc` and never mutate it, which
//! keeps the request hot path synchronization-free.

use crate::http::ParseLimits;
use riptide_hub::Hub;
use riptide_router::{
    CompiledPattern, DispatchError, DispatchResult, Identity, IdentityProvider, PathParams,
    Request, RequestContext, ResultRenderer, Router,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One registered upgrade endpoint (WebSocket or SSE), matched with the
/// same template syntax as plain routes.
#[derive(Debug)]
pub(crate) struct UpgradeRoute {
    pub(crate) template: String,
    pub(crate) pattern: CompiledPattern,
}

/// Request counters, split so telemetry can separate "no route matched"
/// from "handler raised a fault".
#[derive(Debug, Default)]
pub(crate) struct DispatchCounters {
    pub(crate) requests: AtomicU64,
    pub(crate) not_found: AtomicU64,
    pub(crate) method_not_allowed: AtomicU64,
    pub(crate) handler_faults: AtomicU64,
    pub(crate) cancelled: AtomicU64,
}

/// The per-server routing brain shared by every session.
pub struct Dispatcher {
    pub(crate) router: Router,
    pub(crate) renderer: Arc<dyn ResultRenderer>,
    pub(crate) identity: Option<Arc<dyn IdentityProvider>>,
    pub(crate) hub: Arc<Hub>,
    pub(crate) ws_routes: Vec<UpgradeRoute>,
    pub(crate) sse_routes: Vec<UpgradeRoute>,
    pub(crate) limits: ParseLimits,
    pub(crate) keep_alive: Duration,
    pub(crate) max_requests_per_connection: usize,
    pub(crate) sse_ping_interval: Duration,
    pub(crate) counters: DispatchCounters,
}

impl Dispatcher {
    /// Runs the identity provider over a request, if one is configured.
    pub(crate) fn identify(&self, request: &Request) -> Option<Identity> {
        self.identity.as_ref().and_then(|provider| provider.identify(request))
    }

    /// Matches a path against the WebSocket upgrade table.
    pub(crate) fn match_websocket(&self, path: &str) -> Option<PathParams> {
        Self::match_upgrade(&self.ws_routes, path)
    }

    /// Matches a path against the SSE upgrade table.
    pub(crate) fn match_sse(&self, path: &str) -> Option<PathParams> {
        Self::match_upgrade(&self.sse_routes, path)
    }

    fn match_upgrade(routes: &[UpgradeRoute], path: &str) -> Option<PathParams> {
        routes.iter().find_map(|route| route.pattern.match_path(path))
    }

    /// Dispatches one request through the router and invokes the selected
    /// handler.
    ///
    /// This is the single boundary between "invoke handler" and "emit
    /// response": handler error returns and handler panics are both caught
    /// here and folded into the dispatch result, so exactly one authority
    /// decides the client-visible outcome. Returns `None` when the request
    /// was cancelled mid-handler — an expected terminal outcome, not an
    /// error; the session closes without responding.
    pub(crate) async fn dispatch(
        &self,
        request: Request,
        identity: Option<Identity>,
        cancel: CancellationToken,
    ) -> Option<DispatchResult> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let method = request.method;
        let path = request.path.clone();

        let (route, params) = match self.router.dispatch(method, &path) {
            Ok(matched) => (matched.route, matched.params),
            Err(DispatchError::RouteNotFound) => {
                self.counters.not_found.fetch_add(1, Ordering::Relaxed);
                debug!("no route matched {} {}", method, path);
                return Some(DispatchResult::NotFound);
            }
            Err(DispatchError::MethodNotAllowed { allowed }) => {
                self.counters.method_not_allowed.fetch_add(1, Ordering::Relaxed);
                debug!("{} not allowed for {} (allowed: {:?})", method, path, allowed);
                return Some(DispatchResult::MethodNotAllowed { allowed });
            }
        };

        let ctx = RequestContext {
            request,
            params,
            identity,
            cancel: cancel.clone(),
        };

        // Exactly one invocation per dispatched request; a panic inside the
        // handler is caught right here and cannot take the connection down.
        let invocation = AssertUnwindSafe(route.handler.call(ctx)).catch_unwind();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!("request {} {} cancelled", method, path);
                return None;
            }
            outcome = invocation => outcome,
        };

        Some(match outcome {
            Ok(Ok(response)) => DispatchResult::Success(response),
            Ok(Err(riptide_router::HandlerError::Cancelled)) => {
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!("handler for {} {} observed cancellation", method, path);
                return None;
            }
            Ok(Err(riptide_router::HandlerError::Fault(message))) => {
                self.counters.handler_faults.fetch_add(1, Ordering::Relaxed);
                warn!("handler fault on {} {}: {}", method, path, message);
                DispatchResult::Fault { message }
            }
            Err(_) => {
                self.counters.handler_faults.fetch_add(1, Ordering::Relaxed);
                warn!("handler panicked on {} {}", method, path);
                DispatchResult::Fault {
                    message: "handler panicked".to_string(),
                }
            }
        })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.router.len())
            .field("ws_routes", &self.ws_routes.len())
            .field("sse_routes", &self.sse_routes.len())
            .finish()
    }
}
