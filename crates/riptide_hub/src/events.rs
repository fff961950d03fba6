//! Inbound event dispatch: the per-server table of message handlers.
//!
//! Clients send envelopes naming an event; the hub decodes them and routes
//! to the handler registered for that name. One dispatch table per server
//! instance, frozen at startup alongside the route table — no shared
//! mutable callback state.

use crate::connection::ConnectionContext;
use crate::envelope::Envelope;
use crate::error::HubError;
use crate::hub::Hub;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Handler for inbound envelopes of one event name.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one inbound envelope from `ctx`'s connection.
    async fn handle(
        &self,
        hub: Arc<Hub>,
        ctx: ConnectionContext,
        envelope: Envelope,
    ) -> Result<(), HubError>;
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub(crate) struct FnMessageHandler {
    func: Box<
        dyn Fn(Arc<Hub>, ConnectionContext, Envelope) -> BoxFuture<'static, Result<(), HubError>>
            + Send
            + Sync,
    >,
}

impl FnMessageHandler {
    pub(crate) fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Arc<Hub>, ConnectionContext, Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HubError>> + Send + 'static,
    {
        Self {
            func: Box::new(move |hub, ctx, envelope| Box::pin(func(hub, ctx, envelope))),
        }
    }
}

#[async_trait]
impl MessageHandler for FnMessageHandler {
    async fn handle(
        &self,
        hub: Arc<Hub>,
        ctx: ConnectionContext,
        envelope: Envelope,
    ) -> Result<(), HubError> {
        (self.func)(hub, ctx, envelope).await
    }
}

/// Callback invoked when a connection finishes registering with the hub.
pub type ConnectCallback = Arc<dyn Fn(Arc<Hub>, &ConnectionContext) + Send + Sync>;

/// Callback invoked exactly once when a connection is torn down.
pub type DisconnectCallback =
    Arc<dyn Fn(Arc<Hub>, &ConnectionContext, &crate::connection::DisconnectReason) + Send + Sync>;
