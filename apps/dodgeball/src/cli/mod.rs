//! # Dodgeball CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Fetch the initialization config
//! - `identify` - Resolve the source identifier
//! - `status` - Fetch one verification snapshot
//! - `watch` - Follow a verification to its terminal outcome

mod commands;

use clap::{Parser, Subcommand};
use dodgeball_core::DodgeballError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Dodgeball - verification client
///
/// Tracks verifications against the Dodgeball service, running every
/// requested step at most once.
#[derive(Parser, Debug)]
#[command(name = "dodgeball")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Public key (falls back to DODGEBALL_PUBLIC_KEY)
    #[arg(short = 'k', long, global = true)]
    pub public_key: Option<String>,

    /// Suppress informational output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch the integrations the service asks clients to load
    Init,

    /// Resolve and print this client's source identifier
    Identify,

    /// Fetch a verification once and show its state
    Status {
        /// Verification id
        #[arg(short, long)]
        id: String,
    },

    /// Follow a verification until it is approved, denied or failed
    Watch {
        /// Verification id
        #[arg(short, long)]
        id: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments and return the process exit code.
pub async fn execute(cli: Cli) -> Result<i32, DodgeballError> {
    let config = crate::config::load_config(cli.config.as_deref())?;
    let public_key = cli
        .public_key
        .or_else(crate::config::public_key_from_env)
        .ok_or_else(|| {
            DodgeballError::Config(
                "A public key is required (--public-key or DODGEBALL_PUBLIC_KEY)".to_string(),
            )
        })?;
    let output = Output {
        json_mode: cli.json_mode,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Init => cmd_init(&config, &public_key, output).await,
        Commands::Identify => cmd_identify(config, &public_key, output).await,
        Commands::Status { id } => cmd_status(config, &public_key, &id, output).await,
        Commands::Watch { id } => cmd_watch(config, &public_key, &id, output).await,
    }
}
