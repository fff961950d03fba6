//! Command-line argument parsing.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Riptide server.
///
/// Arguments override the corresponding settings from the configuration
/// file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path. A default configuration is written here if
    /// the file does not exist.
    #[arg(short, long, default_value = "riptide.toml")]
    pub config: PathBuf,

    /// Override the listen address, "IP:PORT".
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Enable debug logging.
    #[arg(short, long)]
    pub debug: bool,

    /// Override the maximum number of concurrent connections.
    #[arg(long)]
    pub max_connections: Option<usize>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("riptide.toml"),
            listen: None,
            debug: false,
            max_connections: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default() {
        let args = Args::default();
        assert_eq!(args.config, PathBuf::from("riptide.toml"));
        assert!(!args.debug);
        assert!(args.listen.is_none());
        assert!(args.max_connections.is_none());
    }
}
