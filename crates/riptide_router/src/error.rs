//! Error types for template compilation, route registration, and dispatch.
//!
//! Routing outcomes are plain values: dispatch never panics on malformed
//! input and registration failures are surfaced before the server starts.

use crate::method::Method;
use thiserror::Error;

/// A route template failed to compile.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    /// A wildcard tail segment appeared anywhere but the final position.
    #[error("wildcard segment must be last in template '{template}'")]
    WildcardNotLast { template: String },

    /// Two segments in one template capture under the same name.
    #[error("duplicate parameter ':{name}' in template '{template}'")]
    DuplicateParameter { template: String, name: String },

    /// A `:` segment with no parameter name.
    #[error("empty parameter name in template '{template}'")]
    EmptyParameter { template: String },
}

/// Route registration failed. Fatal at startup: the server refuses to begin
/// serving with an inconsistent table.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegisterError {
    /// The exact (method, normalized template) pair is already registered.
    /// The table is left unchanged; the first registration stays live.
    #[error("duplicate route registration: {method} {template}")]
    DuplicateRoute { method: Method, template: String },

    /// The template itself was invalid.
    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Dispatch could not select a route. Both variants are ordinary outcomes,
/// not faults: the caller maps them to 404 and 405 responses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// No compiled pattern matched the request path for any method.
    #[error("no route matched the request path")]
    RouteNotFound,

    /// Patterns matched the path, but none for the request method. Carries
    /// the set of methods that do match so the caller can emit a correct
    /// `Allow` header.
    #[error("method not allowed; allowed: {allowed:?}")]
    MethodNotAllowed { allowed: Vec<Method> },
}

/// An application handler failed while serving a dispatched request.
///
/// Faults are intercepted at the single boundary between handler invocation
/// and response emission; they are converted to server-error responses and
/// never tear down the connection unless the transport itself is broken.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler reported an application-level failure.
    #[error("handler fault: {0}")]
    Fault(String),

    /// The request was cancelled by client disconnect or server shutdown.
    /// Expected terminal outcome, logged but never treated as an error.
    #[error("request cancelled")]
    Cancelled,
}

impl HandlerError {
    /// Convenience constructor for an application fault message.
    pub fn fault(message: impl Into<String>) -> Self {
        HandlerError::Fault(message.into())
    }
}
