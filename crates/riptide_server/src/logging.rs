//! Logging system setup.
//!
//! Structured logging via `tracing`, with the filter level taken from the
//! `RUST_LOG` environment variable when set, falling back to the CLI debug
//! flag and the configured level.

use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Args, LoggingSettings};

/// Initializes the tracing subscriber.
///
/// Level resolution order: `RUST_LOG` environment variable, then `--debug`,
/// then the configured level (default "info"). When `json_format` is set in
/// the logging settings, log lines are emitted as structured JSON for
/// aggregation systems.
pub fn setup_logging(args: &Args, settings: Option<&LoggingSettings>) -> Result<()> {
    let level = if args.debug {
        "debug"
    } else {
        settings.map(|s| s.level.as_str()).unwrap_or("info")
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let json_format = settings.map(|s| s.json_format).unwrap_or(false);
    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_setup() {
        let args = Args::default();

        // The global subscriber can only be installed once per process, so
        // repeated initialization in the test binary may fail; either way
        // the call must not panic.
        let result = setup_logging(&args, None);
        assert!(result.is_ok() || result.is_err());
    }
}
