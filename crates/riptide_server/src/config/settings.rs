//! Configuration settings structures.
//!
//! These are the on-disk (TOML) settings; the runtime [`ServerConfig`]
//! derived from them lives in the parent module.
//!
//! [`ServerConfig`]: crate::config::ServerConfig

use serde::{Deserialize, Serialize};

/// Root configuration object, serialized to/from TOML.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Server-specific settings.
    pub server: ServerSettings,
    /// Request parsing limits.
    pub limits: LimitSettings,
    /// Optional logging configuration.
    pub logging: Option<LoggingSettings>,
}

/// Core server parameters.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerSettings {
    /// Network address to bind, "IP:PORT".
    pub listen_addr: String,

    /// Maximum concurrent connections (0 = unlimited). Connections beyond
    /// the cap are refused with a 503.
    pub max_connections: usize,

    /// Seconds to keep an idle keep-alive connection open between requests.
    pub keep_alive_secs: u64,

    /// Maximum requests served on one connection before it is closed
    /// (0 = unlimited).
    pub max_requests_per_connection: usize,

    /// Bind one acceptor per CPU core using SO_REUSEPORT.
    pub use_reuse_port: bool,

    /// Seconds between comment keep-alive pings on SSE streams.
    pub sse_ping_interval_secs: u64,
}

/// Request parsing limits, enforced before a request reaches dispatch.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LimitSettings {
    /// Maximum request head (request line + headers) size in bytes.
    pub max_head_bytes: usize,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
    /// Maximum number of request headers.
    pub max_headers: usize,
}

/// Logging configuration.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LoggingSettings {
    /// Filter level: "trace", "debug", "info", "warn", or "error".
    pub level: String,
    /// Emit structured JSON log lines instead of human-readable output.
    pub json_format: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                listen_addr: "127.0.0.1:8080".to_string(),
                max_connections: 1000,
                keep_alive_secs: 75,
                max_requests_per_connection: 0,
                use_reuse_port: false,
                sse_ping_interval_secs: 15,
            },
            limits: LimitSettings {
                max_head_bytes: 16 * 1024,
                max_body_bytes: 1024 * 1024,
                max_headers: 100,
            },
            logging: Some(LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            }),
        }
    }
}
