//! Server builder: registration executed once at startup.
//!
//! Everything registered here — routes, upgrade endpoints, hub callbacks,
//! message handlers — is frozen when `build` is called, before the listener
//! binds. Duplicate route registration fails fast right at the registration
//! call, so a misconfigured server never starts serving.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::server::core::RiptideServer;
use crate::server::dispatcher::{DispatchCounters, Dispatcher, UpgradeRoute};
use riptide_hub::{
    ConnectionContext, DisconnectReason, Envelope, EnvelopeCodec, Hub, HubBuilder, HubError,
};
use riptide_router::{
    CompiledPattern, Handler, IdentityProvider, JsonErrorRenderer, Method, RegisterError,
    ResultRenderer, Router,
};
use std::future::Future;
use std::sync::Arc;

/// Builds a [`RiptideServer`].
pub struct ServerBuilder {
    config: ServerConfig,
    router: Router,
    hub: HubBuilder,
    renderer: Arc<dyn ResultRenderer>,
    identity: Option<Arc<dyn IdentityProvider>>,
    ws_routes: Vec<UpgradeRoute>,
    sse_routes: Vec<UpgradeRoute>,
}

impl ServerBuilder {
    /// Starts a builder with the given runtime configuration, the JSON
    /// error renderer, and an empty routing table.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            hub: HubBuilder::new(),
            renderer: Arc::new(JsonErrorRenderer),
            identity: None,
            ws_routes: Vec::new(),
            sse_routes: Vec::new(),
        }
    }

    /// Registers a request handler for a route template.
    pub fn route(
        mut self,
        method: Method,
        template: &str,
        handler: Handler,
    ) -> Result<Self, ServerError> {
        self.router.register(method, template, handler)?;
        Ok(self)
    }

    /// Registers a request handler with a description for documentation
    /// generators.
    pub fn route_described(
        mut self,
        method: Method,
        template: &str,
        handler: Handler,
        description: &str,
    ) -> Result<Self, ServerError> {
        self.router
            .register_described(method, template, handler, description)?;
        Ok(self)
    }

    /// Registers a WebSocket upgrade endpoint. Uses the same template
    /// syntax as plain routes; captured parameters are handed to the hub
    /// callbacks through the connection context.
    pub fn websocket(mut self, template: &str) -> Result<Self, ServerError> {
        let route = Self::upgrade_route(template, &self.ws_routes)?;
        self.ws_routes.push(route);
        Ok(self)
    }

    /// Registers an SSE attach endpoint (GET only).
    pub fn sse(mut self, template: &str) -> Result<Self, ServerError> {
        let route = Self::upgrade_route(template, &self.sse_routes)?;
        self.sse_routes.push(route);
        Ok(self)
    }

    fn upgrade_route(
        template: &str,
        existing: &[UpgradeRoute],
    ) -> Result<UpgradeRoute, ServerError> {
        let normalized = {
            let trimmed = template.trim_end_matches('/');
            if trimmed.is_empty() {
                "/".to_string()
            } else {
                trimmed.to_string()
            }
        };
        if existing.iter().any(|route| route.template == normalized) {
            return Err(ServerError::Registration(RegisterError::DuplicateRoute {
                method: Method::Get,
                template: normalized,
            }));
        }
        let pattern =
            CompiledPattern::compile(&normalized).map_err(RegisterError::Compile)?;
        Ok(UpgradeRoute {
            template: normalized,
            pattern,
        })
    }

    /// Sets the hub's connect callback.
    pub fn on_connect<F>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Hub>, &ConnectionContext) + Send + Sync + 'static,
    {
        self.hub = self.hub.on_connect(callback);
        self
    }

    /// Sets the hub's disconnect callback.
    pub fn on_disconnect<F>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<Hub>, &ConnectionContext, &DisconnectReason) + Send + Sync + 'static,
    {
        self.hub = self.hub.on_disconnect(callback);
        self
    }

    /// Registers a message handler for inbound envelopes of one event name.
    pub fn on_message<F, Fut>(mut self, event: &str, handler: F) -> Self
    where
        F: Fn(Arc<Hub>, ConnectionContext, Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HubError>> + Send + 'static,
    {
        self.hub = self.hub.on_message(event, handler);
        self
    }

    /// Replaces the result renderer layered over dispatch outcomes.
    pub fn renderer(mut self, renderer: Arc<dyn ResultRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Attaches an identity provider consulted before every dispatch.
    pub fn identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    /// Replaces the hub's envelope codec.
    pub fn codec(mut self, codec: Arc<dyn EnvelopeCodec>) -> Self {
        self.hub = self.hub.codec(codec);
        self
    }

    /// Freezes the registrations and produces a server ready to start.
    pub fn build(self) -> RiptideServer {
        let dispatcher = Arc::new(Dispatcher {
            router: self.router,
            renderer: self.renderer,
            identity: self.identity,
            hub: self.hub.build(),
            ws_routes: self.ws_routes,
            sse_routes: self.sse_routes,
            limits: self.config.limits.clone(),
            keep_alive: self.config.keep_alive,
            max_requests_per_connection: self.config.max_requests_per_connection,
            sse_ping_interval: self.config.sse_ping_interval,
            counters: DispatchCounters::default(),
        });
        RiptideServer::from_parts(self.config, dispatcher)
    }
}
