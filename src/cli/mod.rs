//! CLI module for keypool
//!
//! Command-line interface definitions and handlers.
//!
//! # Commands
//!
//! - `keys` - Inspect the configured credential pool
//! - `simulate` - Drive the dispatcher against the configured limits
//! - `config` - Configuration utilities (init, validate)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # List credentials that are quarantined
//! keypool keys list --status quarantined
//!
//! # Dispatch 20 requests one second apart
//! keypool simulate -m gemini-pro -n 20 --interval-ms 1000
//!
//! # Generate shell completions
//! keypool completions bash > ~/.bash_completion.d/keypool
//! ```

pub mod completions;
pub mod config;
pub mod keys;
pub mod output;
pub mod simulate;

pub use completions::handle_completions;
pub use config::{handle_config_init, handle_config_validate};
pub use keys::handle_keys_list;
pub use simulate::handle_simulate;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::KeyPoolConfig;

/// keypool - Credential pool for rate-limited LLM API keys
#[derive(Parser, Debug)]
#[command(
    name = "keypool",
    version,
    about = "Credential pool and dispatch engine for rate-limited LLM API keys"
)]
pub struct Cli {
    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, env = "KEYPOOL_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect credentials
    #[command(subcommand)]
    Keys(KeysCommands),
    /// Dispatch simulated requests against the configured pool
    Simulate(SimulateArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Subcommand, Debug)]
pub enum KeysCommands {
    /// List configured credentials with their status
    List(KeysListArgs),
}

#[derive(Args, Debug)]
pub struct KeysListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Filter by status (active, cooling, retired, quarantined)
    #[arg(short, long)]
    pub status: Option<String>,

    /// Path to configuration file
    #[arg(short, long, default_value = "keypool.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Model to request
    #[arg(short, long)]
    pub model: String,

    /// Number of requests to dispatch
    #[arg(short = 'n', long, default_value = "10")]
    pub requests: u32,

    /// Simulated time between requests
    #[arg(long, default_value = "0")]
    pub interval_ms: u64,

    /// Print the Prometheus exposition after the run
    #[arg(long)]
    pub metrics: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = "keypool.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
    /// Check a configuration file without starting anything
    Validate(ConfigValidateArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "keypool.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConfigValidateArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "keypool.toml")]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

/// Load configuration with environment overrides
///
/// A missing file falls back to defaults so `KEYPOOL_API_KEYS` alone is
/// enough to run.
pub fn load_config(path: &Path) -> anyhow::Result<KeyPoolConfig> {
    let config = if path.exists() {
        KeyPoolConfig::load(Some(path))
            .with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        KeyPoolConfig::default()
    };

    Ok(config.with_env_overrides()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parse_keys_list_defaults() {
        let cli = Cli::try_parse_from(["keypool", "keys", "list"]).unwrap();
        match cli.command {
            Commands::Keys(KeysCommands::List(args)) => {
                assert_eq!(args.config, PathBuf::from("keypool.toml"));
                assert!(!args.json);
                assert!(args.status.is_none());
            }
            _ => panic!("Expected Keys List command"),
        }
    }

    #[test]
    fn test_cli_parse_keys_list_with_filter() {
        let cli = Cli::try_parse_from([
            "keypool", "keys", "list", "--json", "-s", "cooling", "-c", "pool.toml",
        ])
        .unwrap();
        match cli.command {
            Commands::Keys(KeysCommands::List(args)) => {
                assert!(args.json);
                assert_eq!(args.status.as_deref(), Some("cooling"));
                assert_eq!(args.config, PathBuf::from("pool.toml"));
            }
            _ => panic!("Expected Keys List command"),
        }
    }

    #[test]
    fn test_cli_parse_simulate() {
        let cli = Cli::try_parse_from([
            "keypool",
            "simulate",
            "-m",
            "gemini-pro",
            "-n",
            "25",
            "--interval-ms",
            "500",
            "--metrics",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.model, "gemini-pro");
                assert_eq!(args.requests, 25);
                assert_eq!(args.interval_ms, 500);
                assert!(args.metrics);
            }
            _ => panic!("Expected Simulate command"),
        }
    }

    #[test]
    fn test_cli_simulate_requires_model() {
        assert!(Cli::try_parse_from(["keypool", "simulate"]).is_err());
    }

    #[test]
    fn test_cli_parse_config_validate() {
        let cli = Cli::try_parse_from(["keypool", "config", "validate", "-c", "x.toml"]).unwrap();
        match cli.command {
            Commands::Config(ConfigCommands::Validate(args)) => {
                assert_eq!(args.config, PathBuf::from("x.toml"));
            }
            _ => panic!("Expected Config Validate command"),
        }
    }

    #[test]
    fn test_cli_global_log_level() {
        let cli =
            Cli::try_parse_from(["keypool", "keys", "list", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.failure.max_failures, 3);
    }
}
