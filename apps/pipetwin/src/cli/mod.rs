//! # pipetwin CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new database
//! - `seed` - Load a catalog document
//! - `trace` - Trace up- or downstream from a pipe
//! - `drilldown` - Show the impact neighborhood of a pipe
//! - `ingest` - Ingest telemetry samples from a file
//! - `audit` - Show the audit history of a pipe
//! - `status` - Show row counts

mod commands;

use crate::config::{ConfigError, TwinConfig};
use clap::{Parser, Subcommand};
use pipetwin_core::TwinError;
use std::path::PathBuf;
use thiserror::Error;

pub use commands::*;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Twin(#[from] TwinError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(String),
}

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// pipetwin - pipe-network digital twin
///
/// Keeps a junction/segment graph in sync with pipe geometry, traces it,
/// and runs telemetry through threshold rules.
#[derive(Parser, Debug)]
#[command(name = "pipetwin")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the config file (default: ./pipetwin.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the twin database (overrides config)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new empty database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Load features and reference assets from a catalog JSON file
    Seed {
        /// Path to the catalog file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Trace the pipe network from a segment or pipe feature
    Trace {
        /// Segment id or pipe feature id
        #[arg(short, long)]
        start: String,

        /// "up" or "down"
        #[arg(short, long, default_value = "down")]
        direction: String,
    },

    /// Show what is affected if a pipe fails
    Drilldown {
        /// Feature id
        #[arg(short, long)]
        feature: String,
    },

    /// Ingest telemetry samples (one JSON object or an array)
    Ingest {
        /// Path to the samples file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the audit history of a pipe
    Audit {
        /// Feature id
        #[arg(short, long)]
        feature: String,

        /// Maximum entries (1-200)
        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Show row counts
    Status,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments against a resolved config.
pub async fn execute(cli: Cli, mut config: TwinConfig) -> Result<(), CliError> {
    if let Some(database) = cli.database {
        config.storage.database = database;
    }
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(&config).await
        }
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Seed { file }) => cmd_seed(&config, json_mode, &file),
        Some(Commands::Trace { start, direction }) => {
            cmd_trace(&config, json_mode, &start, &direction)
        }
        Some(Commands::Drilldown { feature }) => cmd_drilldown(&config, json_mode, &feature),
        Some(Commands::Ingest { file }) => cmd_ingest(&config, json_mode, &file),
        Some(Commands::Audit { feature, limit }) => cmd_audit(&config, json_mode, &feature, limit),
        Some(Commands::Status) | None => cmd_status(&config, json_mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pipetwin", "trace", "--start", "road-1", "--direction", "up", "--json-mode", "-D",
            "/tmp/t.redb",
        ])
        .expect("parse");
        assert!(cli.json_mode);
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/t.redb")));
        assert!(matches!(
            cli.command,
            Some(Commands::Trace { ref start, ref direction }) if start == "road-1" && direction == "up"
        ));
    }

    #[test]
    fn trace_requires_start() {
        assert!(Cli::try_parse_from(["pipetwin", "trace"]).is_err());
    }
}
