//! Configuration: file settings, CLI arguments, and the runtime config.

pub mod args;
pub mod settings;

pub use args::Args;
pub use settings::{Config, LimitSettings, LoggingSettings, ServerSettings};

use crate::error::ServerError;
use crate::http::ParseLimits;
use anyhow::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, warn};

/// Runtime server configuration, derived from the file settings with CLI
/// overrides applied.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the server binds to.
    pub bind_address: SocketAddr,
    /// Maximum concurrent connections (0 = unlimited).
    pub max_connections: usize,
    /// Idle keep-alive window between requests on one connection.
    pub keep_alive: Duration,
    /// Requests served on one connection before it is closed (0 = unlimited).
    pub max_requests_per_connection: usize,
    /// One acceptor per CPU core via SO_REUSEPORT.
    pub use_reuse_port: bool,
    /// Request parsing limits.
    pub limits: ParseLimits,
    /// Interval between SSE comment keep-alive pings.
    pub sse_ping_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".parse().expect("static address"),
            max_connections: 1000,
            keep_alive: Duration::from_secs(75),
            max_requests_per_connection: 0,
            use_reuse_port: false,
            limits: ParseLimits::default(),
            sse_ping_interval: Duration::from_secs(15),
        }
    }
}

impl ServerConfig {
    /// Builds the runtime configuration from file settings and CLI
    /// overrides.
    pub fn from_settings(config: &Config, args: &Args) -> Result<Self, ServerError> {
        let bind_address = args
            .listen
            .as_deref()
            .unwrap_or(&config.server.listen_addr)
            .parse()
            .map_err(|e| ServerError::Network(format!("invalid listen address: {e}")))?;

        Ok(Self {
            bind_address,
            max_connections: args.max_connections.unwrap_or(config.server.max_connections),
            keep_alive: Duration::from_secs(config.server.keep_alive_secs),
            max_requests_per_connection: config.server.max_requests_per_connection,
            use_reuse_port: config.server.use_reuse_port,
            limits: ParseLimits {
                max_head_bytes: config.limits.max_head_bytes,
                max_body_bytes: config.limits.max_body_bytes,
                max_headers: config.limits.max_headers,
            },
            sse_ping_interval: Duration::from_secs(config.server.sse_ping_interval_secs),
        })
    }
}

/// Loads configuration from file, or creates the default configuration file
/// when it does not exist yet.
pub async fn load_config(args: &Args) -> Result<Config> {
    if args.config.exists() {
        let config_str = tokio::fs::read_to_string(&args.config).await?;
        match toml::de::from_str::<Config>(&config_str) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("failed to parse config file {}: {}", args.config.display(), e);
                Err(e.into())
            }
        }
    } else {
        warn!(
            "configuration file not found: {}, using defaults",
            args.config.display()
        );

        let default_config = Config::default();
        let config_str = toml::to_string_pretty(&default_config)?;
        tokio::fs::write(&args.config, config_str).await?;
        info!("created default configuration file: {}", args.config.display());

        Ok(default_config)
    }
}
