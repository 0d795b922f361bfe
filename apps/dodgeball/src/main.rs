//! # Dodgeball - verification client
//!
//! Command-line front end for the Dodgeball client engine.
//!
//! ## Usage
//!
//! ```bash
//! # Integrations the service wants loaded at startup
//! dodgeball --public-key pk_live_123 init
//!
//! # Resolve this device's source identifier
//! dodgeball identify
//!
//! # One snapshot, or follow a verification to its outcome
//! dodgeball status --id 7c1f…
//! dodgeball watch --id 7c1f…
//! ```

use clap::Parser;
use dodgeball::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // DODGEBALL_LOG_FORMAT=json enables machine-parseable output.
    // Logs go to stderr; stdout carries command output.
    let log_format = std::env::var("DODGEBALL_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dodgeball=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    match cli::execute(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
