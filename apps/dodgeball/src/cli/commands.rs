//! # CLI Command Implementations
//!
//! Each command builds what it needs from the loaded configuration and
//! prints either human-readable text or a single JSON document.

use crate::client::{DodgeballClient, VerificationService};
use crate::context::Dodgeball;
use crate::engine::{Resolution, VerificationHandler};
use async_trait::async_trait;
use dodgeball_core::{DodgeballConfig, DodgeballError, Verification};

// =============================================================================
// OUTPUT
// =============================================================================

/// Process exit codes for `watch`.
pub const EXIT_APPROVED: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_DENIED: i32 = 2;

/// Output flags shared by every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub json_mode: bool,
    pub quiet: bool,
}

impl Output {
    fn json(&self, value: &serde_json::Value) -> Result<(), DodgeballError> {
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| DodgeballError::ParseError(e.to_string()))?;
        println!("{}", text);
        Ok(())
    }

    fn info(&self, line: &str) {
        if !self.quiet {
            println!("{}", line);
        }
    }
}

fn describe(verification: &Verification) -> String {
    format!(
        "Verification {}: status={}, outcome={}, steps={}",
        verification.id,
        verification.status.as_str(),
        verification.outcome.as_str(),
        verification.next_steps.len()
    )
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Fetch and show the initialization config.
pub async fn cmd_init(
    config: &DodgeballConfig,
    public_key: &str,
    output: Output,
) -> Result<i32, DodgeballError> {
    let client = DodgeballClient::new(config, public_key);
    let init = client.init_config().await?;

    if output.json_mode {
        let value = serde_json::to_value(&init)
            .map_err(|e| DodgeballError::ParseError(e.to_string()))?;
        output.json(&value)?;
        return Ok(EXIT_APPROVED);
    }

    output.info("Dodgeball Init Config");
    output.info("=====================");
    if !init.request_id.is_empty() {
        println!("Request:      {}", init.request_id);
    }
    println!("Integrations: {}", init.libs.len());
    for lib in &init.libs {
        let origin = match &lib.content {
            Some(content) if content.url.is_some() => "url",
            Some(content) if content.text.is_some() => "inline",
            _ => "none",
        };
        println!("  {} ({})", lib.name, origin);
    }
    Ok(EXIT_APPROVED)
}

/// Resolve and print the source identifier.
pub async fn cmd_identify(
    config: DodgeballConfig,
    public_key: &str,
    output: Output,
) -> Result<i32, DodgeballError> {
    let dodgeball = Dodgeball::builder(public_key).config(config).build();
    let source_id = dodgeball.initialize().await;
    dodgeball.dispose();

    if output.json_mode {
        output.json(&serde_json::json!({ "sourceId": source_id }))?;
    } else if source_id.is_empty() {
        output.info("No source identifier could be resolved");
    } else {
        println!("{}", source_id);
    }
    Ok(EXIT_APPROVED)
}

/// Fetch a single verification snapshot.
pub async fn cmd_status(
    config: DodgeballConfig,
    public_key: &str,
    verification_id: &str,
    output: Output,
) -> Result<i32, DodgeballError> {
    let dodgeball = Dodgeball::builder(public_key).config(config).build();
    let verification = dodgeball.query_verification(verification_id).await?;

    if output.json_mode {
        let value = serde_json::to_value(&verification)
            .map_err(|e| DodgeballError::ParseError(e.to_string()))?;
        output.json(&value)?;
    } else {
        println!("{}", describe(&verification));
        println!(
            "  pending={} allowed={} denied={} error={}",
            dodgeball.is_pending(&verification),
            dodgeball.is_allowed(&verification),
            dodgeball.is_denied(&verification),
            dodgeball.is_error(&verification)
        );
        for step in &verification.next_steps {
            println!("  step {} -> {}", step.id, step.name);
        }
    }
    Ok(EXIT_APPROVED)
}

/// Follow a verification until its outcome is decided.
pub async fn cmd_watch(
    config: DodgeballConfig,
    public_key: &str,
    verification_id: &str,
    output: Output,
) -> Result<i32, DodgeballError> {
    let dodgeball = Dodgeball::builder(public_key).config(config).build();
    dodgeball.track();

    let initial = dodgeball.query_verification(verification_id).await?;
    output.info(&describe(&initial));

    let handler = ConsoleHandler { output };
    let resolution = dodgeball.handle_verification(Some(initial), &handler).await;
    dodgeball.dispose();

    Ok(match resolution {
        Resolution::Verified(_) | Resolution::Approved => EXIT_APPROVED,
        Resolution::Denied(_) => EXIT_DENIED,
        Resolution::Error(_) => EXIT_ERROR,
    })
}

// =============================================================================
// CONSOLE HANDLER
// =============================================================================

/// Prints terminal outcomes to stdout.
pub struct ConsoleHandler {
    pub output: Output,
}

impl ConsoleHandler {
    fn report(&self, event: &str, verification: Option<&Verification>, message: Option<&str>) {
        if self.output.json_mode {
            let value = serde_json::json!({
                "event": event,
                "verification": verification,
                "message": message,
            });
            if let Err(e) = self.output.json(&value) {
                tracing::warn!(error = %e, "Failed to render outcome");
            }
            return;
        }
        match (verification, message) {
            (Some(v), _) => println!("{}: {}", event, describe(v)),
            (None, Some(m)) => println!("{}: {}", event, m),
            (None, None) => println!("{}", event),
        }
    }
}

#[async_trait]
impl VerificationHandler for ConsoleHandler {
    async fn on_verified(&self, verification: &Verification) {
        self.report("verified", Some(verification), None);
    }

    async fn on_denied(&self, verification: &Verification) {
        self.report("denied", Some(verification), None);
    }

    async fn on_error(&self, message: &str) {
        self.report("error", None, Some(message));
    }

    async fn on_approved(&self, verification: Option<&Verification>) {
        self.report("approved", verification, None);
    }
}
