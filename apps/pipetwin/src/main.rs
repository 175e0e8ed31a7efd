//! # pipetwin - Pipe-Network Digital Twin Server
//!
//! The main binary of the asset topology & telemetry engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 apps/pipetwin (THE BINARY)               │
//! │                                                          │
//! │   ┌─────────────┐    ┌─────────────┐    ┌────────────┐   │
//! │   │    CLI      │    │  HTTP API   │    │   Config   │   │
//! │   │   (clap)    │    │   (axum)    │    │   (toml)   │   │
//! │   └──────┬──────┘    └──────┬──────┘    └─────┬──────┘   │
//! │          └──────────────────┼─────────────────┘          │
//! │                             ▼                            │
//! │                    ┌─────────────────┐                   │
//! │                    │  pipetwin-core  │                   │
//! │                    │   (THE LOGIC)   │                   │
//! │                    └─────────────────┘                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! pipetwin server --host 0.0.0.0 --port 8080
//! pipetwin seed -f catalog.json
//! pipetwin trace --start road-1 --direction up
//! pipetwin ingest -f samples.json
//! ```

use clap::Parser;
use pipetwin::cli;
use pipetwin::config::{LoggingConfig, TwinConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "pipetwin=info,pipetwin_core=info,tower_http=debug";

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Logging is not up yet, so config errors go straight to stderr.
    let config = match TwinConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pipetwin: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging);

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli, config).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// filter; `logging.format = "json"` (or `PIPETWIN_LOG_FORMAT=json`)
/// switches to machine-parseable output.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        logging
            .filter
            .as_deref()
            .unwrap_or(DEFAULT_LOG_FILTER)
            .into()
    });

    match logging.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  ┌─┐┬┌─┐┌─┐┌┬┐┬ ┬┬┌┐┌
  ├─┘│├─┘├┤  │ ││││││││
  ┴  ┴┴  └─┘ ┴ └┴┘┴┘└┘

  Pipe-network digital twin v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
