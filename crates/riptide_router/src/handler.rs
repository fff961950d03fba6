//! Handler abstraction and the result-rendering pipeline.
//!
//! Handlers are plain async functions over an explicit [`RequestContext`];
//! shared behavior composes around them instead of living in a controller
//! hierarchy. The [`ResultRenderer`] hook is the single authority that turns
//! every dispatch outcome into the client-visible response, so alternate
//! renderers (files, templated views, JSON) can be layered uniformly.

use crate::error::HandlerError;
use crate::method::Method;
use crate::pattern::PathParams;
use crate::request::Request;
use crate::response::{Response, Status};
use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Identity attached to a request by the authentication collaborator.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Stable subject identifier.
    pub subject: String,
    /// Provider-defined claims.
    pub claims: serde_json::Value,
}

/// Authentication/identity collaborator boundary.
///
/// The core never validates credentials itself; a provider inspects the raw
/// request and, when it recognizes the caller, attaches an [`Identity`] to
/// the request context before the handler runs.
pub trait IdentityProvider: Send + Sync {
    /// Identifies the caller of `request`, or returns `None` for anonymous.
    fn identify(&self, request: &Request) -> Option<Identity>;
}

/// Everything a handler gets to see about one dispatched request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The parsed request.
    pub request: Request,
    /// Parameters captured by the matched route template.
    pub params: PathParams,
    /// Identity attached by the identity provider, if any.
    pub identity: Option<Identity>,
    /// Cancellation signal for this request. Triggered by client disconnect
    /// or server shutdown; handlers should observe it and unwind.
    pub cancel: CancellationToken,
}

impl RequestContext {
    /// Looks up a captured path parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// A registered request handler.
///
/// Wraps an async function so routes can store handlers uniformly. Cloning
/// is cheap; the underlying function is shared.
#[derive(Clone)]
pub struct Handler {
    func: Arc<dyn Fn(RequestContext) -> BoxFuture<'static, Result<Response, HandlerError>> + Send + Sync>,
}

impl Handler {
    /// Invokes the handler for one request.
    pub fn call(&self, ctx: RequestContext) -> BoxFuture<'static, Result<Response, HandlerError>> {
        (self.func)(ctx)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler")
    }
}

/// Adapts an async function into a [`Handler`].
pub fn handler<F, Fut>(func: F) -> Handler
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    Handler {
        func: Arc::new(move |ctx| Box::pin(func(ctx))),
    }
}

/// The outcome of dispatching one request, as seen by the rendering
/// pipeline. Separates "no route matched" from "handler raised a fault" so
/// telemetry built above the core can tell the two apart.
#[derive(Debug)]
pub enum DispatchResult {
    /// The handler completed and produced a response.
    Success(Response),
    /// No route matched the request path.
    NotFound,
    /// The path matched but not for this method.
    MethodNotAllowed { allowed: Vec<Method> },
    /// The request could not be parsed or violated protocol limits.
    Malformed { reason: String },
    /// The handler faulted (error return or panic), caught at the dispatch
    /// boundary.
    Fault { message: String },
}

/// Renders every dispatch outcome into the client-visible response.
pub trait ResultRenderer: Send + Sync {
    /// Produces the response for `result`.
    fn render(&self, result: DispatchResult) -> Response;
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    detail: &'a str,
}

/// Default renderer: passes successful responses through untouched and
/// renders every error class as a small JSON body.
#[derive(Debug, Default)]
pub struct JsonErrorRenderer;

impl JsonErrorRenderer {
    fn error(&self, status: Status, error: &str, detail: &str) -> Response {
        Response::json(&ErrorBody { error, detail }).with_status(status)
    }
}

impl ResultRenderer for JsonErrorRenderer {
    fn render(&self, result: DispatchResult) -> Response {
        match result {
            DispatchResult::Success(response) => response,
            DispatchResult::NotFound => {
                self.error(Status::NotFound, "not_found", "no route matched the request path")
            }
            DispatchResult::MethodNotAllowed { allowed } => {
                let allow = allowed
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                self.error(Status::MethodNotAllowed, "method_not_allowed", "method not allowed for this path")
                    .with_header("allow", allow)
            }
            DispatchResult::Malformed { reason } => {
                self.error(Status::BadRequest, "malformed_request", &reason)
            }
            DispatchResult::Fault { message } => {
                self.error(Status::InternalServerError, "handler_fault", &message)
            }
        }
    }
}
