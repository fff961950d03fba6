//! The routing table: registration, specificity-ranked dispatch, and
//! introspection.
//!
//! Registration happens once, at startup; after the table is frozen behind
//! an `Arc` the dispatch hot path is read-only and needs no synchronization.

use crate::error::{DispatchError, RegisterError};
use crate::handler::Handler;
use crate::method::Method;
use crate::pattern::{CompiledPattern, PathParams};
use crate::route::{Route, RouteInfo};

/// A successful dispatch: the selected route plus the parameters its
/// template captured from the request path.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: PathParams,
}

/// The routing table.
///
/// Routes are ranked by specificity (literal segments outrank parameters,
/// parameters outrank wildcards); equal scores fall back to registration
/// order, first wins. Both rules are deliberate, documented behavior and
/// pinned by unit tests below.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
    prefix: String,
}

impl Router {
    /// An empty routing table with no mount prefix.
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            prefix: String::new(),
        }
    }

    /// An empty routing table whose non-absolute routes are mounted under
    /// `prefix` (e.g. `/api`).
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        let raw: String = prefix.into();
        let trimmed = raw.trim_end_matches('/');
        let prefix = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Self {
            routes: Vec::new(),
            prefix,
        }
    }

    /// Registers a route under the mount prefix.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::DuplicateRoute`] if the exact
    /// (method, normalized template) pair is already present — the table is
    /// left unchanged and the first registration stays dispatchable — or a
    /// compile error if the template is invalid.
    pub fn register(
        &mut self,
        method: Method,
        template: &str,
        handler: Handler,
    ) -> Result<(), RegisterError> {
        self.insert(method, template, handler, None, false)
    }

    /// Registers a route with a description for documentation generators.
    pub fn register_described(
        &mut self,
        method: Method,
        template: &str,
        handler: Handler,
        description: impl Into<String>,
    ) -> Result<(), RegisterError> {
        self.insert(method, template, handler, Some(description.into()), false)
    }

    /// Registers a route that bypasses the mount prefix.
    pub fn register_absolute(
        &mut self,
        method: Method,
        template: &str,
        handler: Handler,
    ) -> Result<(), RegisterError> {
        self.insert(method, template, handler, None, true)
    }

    fn insert(
        &mut self,
        method: Method,
        template: &str,
        handler: Handler,
        description: Option<String>,
        absolute: bool,
    ) -> Result<(), RegisterError> {
        let full = if absolute || self.prefix.is_empty() {
            normalize_template(template)
        } else {
            normalize_template(&format!("{}/{}", self.prefix, template.trim_start_matches('/')))
        };

        if self
            .routes
            .iter()
            .any(|route| route.method == method && route.template == full)
        {
            return Err(RegisterError::DuplicateRoute {
                method,
                template: full,
            });
        }

        let pattern = CompiledPattern::compile(&full)?;
        let index = self.routes.len();
        self.routes.push(Route {
            method,
            template: full,
            pattern,
            handler,
            absolute,
            description,
            index,
        });
        Ok(())
    }

    /// Dispatches a (method, path) pair to the best-matching route.
    ///
    /// Among all patterns matching the path regardless of method: none at
    /// all is [`DispatchError::RouteNotFound`]; some but none for `method`
    /// is [`DispatchError::MethodNotAllowed`] carrying the methods that do
    /// match. Among full matches the highest specificity wins, ties broken
    /// by registration order. Every outcome is a value; malformed input can
    /// not make this panic.
    pub fn dispatch(&self, method: Method, path: &str) -> Result<RouteMatch<'_>, DispatchError> {
        let mut best: Option<(&Route, PathParams)> = None;
        let mut allowed: Vec<Method> = Vec::new();

        for route in &self.routes {
            let Some(params) = route.pattern.match_path(path) else {
                continue;
            };
            if !allowed.contains(&route.method) {
                allowed.push(route.method);
            }
            if route.method != method {
                continue;
            }
            let better = match &best {
                Some((current, _)) => route.pattern.specificity() > current.pattern.specificity(),
                None => true,
            };
            if better {
                best = Some((route, params));
            }
        }

        match best {
            Some((route, params)) => Ok(RouteMatch { route, params }),
            None if allowed.is_empty() => Err(DispatchError::RouteNotFound),
            None => Err(DispatchError::MethodNotAllowed { allowed }),
        }
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Introspection over the frozen table, in registration order.
    pub fn routes(&self) -> impl Iterator<Item = RouteInfo> + '_ {
        self.routes.iter().map(RouteInfo::from)
    }
}

/// Normalizes a template: leading slash enforced, trailing slashes trimmed,
/// root stays `/`.
fn normalize_template(template: &str) -> String {
    let trimmed = template.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler, RequestContext};
    use crate::response::Response;

    fn tagged(tag: &'static str) -> Handler {
        handler(move |_ctx: RequestContext| async move { Ok(Response::text(tag)) })
    }

    fn body_of(m: &RouteMatch<'_>) -> String {
        m.route.description.clone().unwrap_or_default()
    }

    fn register_tagged(router: &mut Router, method: Method, template: &str, tag: &str) {
        router
            .register_described(method, template, tagged("x"), tag)
            .expect("registration should succeed");
    }

    #[test]
    fn literal_route_beats_parameter_route() {
        let mut router = Router::new();
        register_tagged(&mut router, Method::Get, "/user/:id", "param");
        register_tagged(&mut router, Method::Get, "/user/admin", "literal");

        let matched = router.dispatch(Method::Get, "/user/admin").unwrap();
        assert_eq!(body_of(&matched), "literal");

        let matched = router.dispatch(Method::Get, "/user/42").unwrap();
        assert_eq!(body_of(&matched), "param");
        assert_eq!(matched.params.get("id").map(String::as_str), Some("42"));
    }

    #[test]
    fn empty_table_reports_route_not_found() {
        let router = Router::new();
        let err = router.dispatch(Method::Get, "/missing").unwrap_err();
        assert_eq!(err, DispatchError::RouteNotFound);
    }

    #[test]
    fn wrong_method_reports_allowed_set() {
        let mut router = Router::new();
        register_tagged(&mut router, Method::Get, "/user/:id", "get");

        let err = router.dispatch(Method::Post, "/user/1").unwrap_err();
        assert_eq!(
            err,
            DispatchError::MethodNotAllowed {
                allowed: vec![Method::Get]
            }
        );
    }

    #[test]
    fn allowed_set_collects_every_matching_method() {
        let mut router = Router::new();
        register_tagged(&mut router, Method::Get, "/thing/:id", "get");
        register_tagged(&mut router, Method::Delete, "/thing/:id", "delete");

        let err = router.dispatch(Method::Post, "/thing/9").unwrap_err();
        let DispatchError::MethodNotAllowed { allowed } = err else {
            panic!("expected MethodNotAllowed");
        };
        assert!(allowed.contains(&Method::Get));
        assert!(allowed.contains(&Method::Delete));
        assert_eq!(allowed.len(), 2);
    }

    #[test]
    fn duplicate_registration_is_rejected_and_table_unchanged() {
        let mut router = Router::new();
        register_tagged(&mut router, Method::Get, "/x", "first");

        let err = router
            .register_described(Method::Get, "/x", tagged("x"), "second")
            .unwrap_err();
        assert!(matches!(err, RegisterError::DuplicateRoute { .. }));
        assert_eq!(router.len(), 1);

        // First registration still dispatches.
        let matched = router.dispatch(Method::Get, "/x").unwrap();
        assert_eq!(body_of(&matched), "first");
    }

    #[test]
    fn duplicate_detection_normalizes_trailing_slash() {
        let mut router = Router::new();
        register_tagged(&mut router, Method::Get, "/x", "first");
        let err = router.register(Method::Get, "/x/", tagged("x")).unwrap_err();
        assert!(matches!(err, RegisterError::DuplicateRoute { .. }));
    }

    #[test]
    fn equal_specificity_falls_back_to_registration_order() {
        // Two parameter routes with identical scores for the same method:
        // the first registered must win. This is a documented rule, not an
        // accident of iteration.
        let mut router = Router::new();
        register_tagged(&mut router, Method::Get, "/user/:name", "first");
        register_tagged(&mut router, Method::Get, "/user/:other", "second");

        let matched = router.dispatch(Method::Get, "/user/kim").unwrap();
        assert_eq!(body_of(&matched), "first");
        assert_eq!(matched.params.get("name").map(String::as_str), Some("kim"));
    }

    #[test]
    fn parameter_route_beats_wildcard_route() {
        let mut router = Router::new();
        register_tagged(&mut router, Method::Get, "/files/:rest*", "wild");
        register_tagged(&mut router, Method::Get, "/files/:name", "param");

        let matched = router.dispatch(Method::Get, "/files/report.txt").unwrap();
        assert_eq!(body_of(&matched), "param");

        let matched = router.dispatch(Method::Get, "/files/a/b").unwrap();
        assert_eq!(body_of(&matched), "wild");
    }

    #[test]
    fn mount_prefix_applies_unless_absolute() {
        let mut router = Router::with_prefix("/api");
        register_tagged(&mut router, Method::Get, "/users", "users");
        router
            .register_absolute(Method::Get, "/healthz", tagged("x"))
            .unwrap();

        assert!(router.dispatch(Method::Get, "/api/users").is_ok());
        assert!(router.dispatch(Method::Get, "/healthz").is_ok());
        assert_eq!(
            router.dispatch(Method::Get, "/users").unwrap_err(),
            DispatchError::RouteNotFound
        );
    }

    #[test]
    fn introspection_lists_routes_in_registration_order() {
        let mut router = Router::new();
        register_tagged(&mut router, Method::Get, "/a", "first");
        register_tagged(&mut router, Method::Post, "/b", "second");

        let infos: Vec<RouteInfo> = router.routes().collect();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].template, "/a");
        assert_eq!(infos[0].description.as_deref(), Some("first"));
        assert_eq!(infos[1].method, Method::Post);
    }
}
