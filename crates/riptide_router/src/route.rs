//! Route records and table introspection metadata.

use crate::handler::Handler;
use crate::method::Method;
use crate::pattern::CompiledPattern;

/// One registered route. Immutable once the table is frozen at server start.
#[derive(Debug, Clone)]
pub struct Route {
    /// Request method this route serves.
    pub method: Method,
    /// Normalized template the route was registered under (prefix applied
    /// unless the route was registered as absolute).
    pub template: String,
    /// Compiled matchable form of the template.
    pub pattern: CompiledPattern,
    /// The handler invoked on dispatch.
    pub handler: Handler,
    /// Whether the template bypassed the router's mount prefix.
    pub absolute: bool,
    /// Human-readable description, surfaced through table introspection for
    /// documentation generators.
    pub description: Option<String>,
    /// Registration position, used as the deterministic specificity
    /// tie-break (first registered wins).
    pub index: usize,
}

/// Introspection view of a route, for collaborator layers that generate
/// API documentation from the frozen table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: Method,
    pub template: String,
    pub description: Option<String>,
}

impl From<&Route> for RouteInfo {
    fn from(route: &Route) -> Self {
        Self {
            method: route.method,
            template: route.template.clone(),
            description: route.description.clone(),
        }
    }
}
