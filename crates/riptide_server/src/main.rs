//! Riptide server binary.
//!
//! Wires the reference application over the core: health/version routes, a
//! room-based WebSocket chat endpoint, and a matching SSE feed, configured
//! from a TOML file with CLI overrides and graceful shutdown handling.

use anyhow::Result;
use clap::Parser;
use riptide_hub::{ConnectionContext, Envelope, Hub};
use riptide_router::{handler, HandlerError, Method, RequestContext, Response};
use riptide_server::config::{self, Args, ServerConfig};
use riptide_server::{logging, shutdown, RiptideServer, ServerError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = Instant::now();

    let args = Args::parse();

    // Config is loaded before the subscriber exists so the logging section
    // can pick the output format.
    let config_file = config::load_config(&args).await?;
    logging::setup_logging(&args, config_file.logging.as_ref())?;

    info!("starting riptide server");
    info!("version: {}", env!("CARGO_PKG_VERSION"));
    info!("configuration loaded from: {}", args.config.display());

    let server_config = ServerConfig::from_settings(&config_file, &args)?;
    let server = build_server(server_config)?;

    for route in server.routes() {
        info!(
            "route: {} {}{}",
            route.method,
            route.template,
            route
                .description
                .as_deref()
                .map(|d| format!(" - {d}"))
                .unwrap_or_default()
        );
    }

    let shutdown_receiver = shutdown::setup_shutdown_handler().await;
    info!("startup complete in {:.2?}", startup_start.elapsed());

    tokio::select! {
        result = server.start() => {
            match result {
                Ok(_) => info!("server stopped normally"),
                Err(e) => {
                    error!("server error: {}", e);
                    return Err(e.into());
                }
            }
        }
        _ = shutdown_receiver => {
            let shutdown_start = Instant::now();
            if let Err(e) = server.shutdown().await {
                error!("error during shutdown: {}", e);
            }
            info!("server shutdown completed in {:.2?}", shutdown_start.elapsed());
        }
    }

    Ok(())
}

/// Assembles the reference application: plain routes, the chat rooms, and
/// the event feed.
fn build_server(config: ServerConfig) -> Result<RiptideServer, ServerError> {
    let builder = RiptideServer::builder(config)
        .route_described(Method::Get, "/healthz", handler(health), "liveness probe")?
        .route_described(Method::Get, "/version", handler(version), "build version")?
        .websocket("/ws/:room")?
        .sse("/events/:room")?
        .on_connect(|hub: Arc<Hub>, ctx: &ConnectionContext| {
            if let Some(room) = ctx.params.get("room") {
                let _ = hub.join(room, ctx.id);
                info!("connection {} joined room '{}'", ctx.id, room);
            }
        })
        .on_disconnect(|_hub: Arc<Hub>, ctx: &ConnectionContext, reason| {
            info!("connection {} left: {}", ctx.id, reason);
        })
        .on_message(
            "chat",
            |hub: Arc<Hub>, ctx: ConnectionContext, envelope: Envelope| async move {
                let Some(room) = ctx.params.get("room") else {
                    return Ok(());
                };
                hub.broadcast(room, &Envelope::new("chat", envelope.data).excluding(ctx.id))?;
                Ok(())
            },
        );

    Ok(builder.build())
}

async fn health(_ctx: RequestContext) -> Result<Response, HandlerError> {
    Ok(Response::json(&serde_json::json!({ "status": "ok" })))
}

async fn version(_ctx: RequestContext) -> Result<Response, HandlerError> {
    Ok(Response::text(env!("CARGO_PKG_VERSION")))
}
