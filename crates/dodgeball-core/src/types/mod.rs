//! # Core Type Definitions
//!
//! This module contains the wire-level data model shared by every layer:
//! - Verification snapshots (`Verification`, `VerificationStatus`, `VerificationOutcome`)
//! - Steps requested by the remote workflow (`VerificationStep`)
//! - Integration descriptors (`LibConfig`, `LibContent`, `InitConfig`)
//! - Identification payloads (`Fingerprint`) and step results (`StepResponse`)
//! - Error types (`DodgeballError`)
//!
//! ## Ownership
//!
//! Snapshots are owned by the remote service. The client only ever replaces
//! its local copy with a newer snapshot; nothing here is mutated in place by
//! the engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

// =============================================================================
// STATUS & OUTCOME
// =============================================================================

/// Processing status of a verification on the remote side.
///
/// An unrecognized status deserializes to `Unknown`, so the snapshot still
/// parses and routing is left to the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Complete,
    Failed,
    #[serde(other)]
    Unknown,
}

impl VerificationStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision reached (or not yet reached) for a verification.
///
/// `Pending`, `Waiting` and `Blocked` are in progress. Anything the client
/// does not recognize deserializes to `Unknown` instead of failing the poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationOutcome {
    Pending,
    Waiting,
    Blocked,
    Approved,
    Denied,
    Error,
    #[serde(other)]
    Unknown,
}

impl VerificationOutcome {
    /// True while the remote workflow has not reached a decision.
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(self, Self::Pending | Self::Waiting | Self::Blocked)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Waiting => "WAITING",
            Self::Blocked => "BLOCKED",
            Self::Approved => "APPROVED",
            Self::Denied => "DENIED",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// INTEGRATION DESCRIPTORS
// =============================================================================

/// Where the source of an integration module comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LibContent {
    /// Remote location of the module source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Inline module source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl LibContent {
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            text: None,
        }
    }

    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            url: None,
            text: Some(text.into()),
        }
    }

    /// A descriptor is loadable only when it points somewhere.
    #[must_use]
    pub fn is_loadable(&self) -> bool {
        self.url.is_some() || self.text.is_some()
    }
}

/// Integration descriptor.
///
/// `name` selects the integration; every field other than `name` and
/// `content` is integration-specific and kept verbatim in `config`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LibConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<LibContent>,
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

impl LibConfig {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: None,
            config: Map::new(),
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: LibContent) -> Self {
        self.content = Some(content);
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Content that can actually be acquired, if any.
    #[must_use]
    pub fn loadable_content(&self) -> Option<&LibContent> {
        self.content.as_ref().filter(|c| c.is_loadable())
    }
}

/// Response of `GET init`: the integrations every page load runs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitConfig {
    pub request_id: String,
    #[serde(default)]
    pub libs: Vec<LibConfig>,
}

// =============================================================================
// VERIFICATION STEP
// =============================================================================

/// A unit of client-side work the remote workflow asks for.
///
/// A step doubles as an integration descriptor: its `name` and `content`
/// select and locate the module, the remaining fields configure it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStep {
    /// Unique within the lifetime of the verification.
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Correlates a submitted result with the remote workflow step.
    #[serde(default)]
    pub verification_step_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<LibContent>,
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

impl VerificationStep {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_verification_step_id(mut self, verification_step_id: impl Into<String>) -> Self {
        self.verification_step_id = verification_step_id.into();
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: LibContent) -> Self {
        self.content = Some(content);
        self
    }

    /// Build the descriptor used to load this step's integration.
    ///
    /// Step identity travels along in the descriptor's config so the
    /// integration can see which step it is serving.
    #[must_use]
    pub fn to_lib_config(&self) -> LibConfig {
        let mut config = self.config.clone();
        config.insert("id".to_string(), Value::String(self.id.clone()));
        config.insert(
            "verificationStepId".to_string(),
            Value::String(self.verification_step_id.clone()),
        );
        LibConfig {
            name: self.name.clone(),
            content: self.content.clone(),
            config,
        }
    }
}

// =============================================================================
// VERIFICATION
// =============================================================================

/// Snapshot of a remote verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub id: String,
    pub status: VerificationStatus,
    pub outcome: VerificationOutcome,
    #[serde(default)]
    pub next_steps: Vec<VerificationStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Verification {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        status: VerificationStatus,
        outcome: VerificationOutcome,
    ) -> Self {
        Self {
            id: id.into(),
            status,
            outcome,
            next_steps: Vec::new(),
            error: None,
        }
    }

    #[must_use]
    pub fn with_steps(mut self, steps: Vec<VerificationStep>) -> Self {
        self.next_steps = steps;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Still being processed remotely.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == VerificationStatus::Pending
    }

    /// Completed and approved.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.status == VerificationStatus::Complete
            && self.outcome == VerificationOutcome::Approved
    }

    /// Completed and denied.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        self.status == VerificationStatus::Complete && self.outcome == VerificationOutcome::Denied
    }

    /// Failed with an error outcome.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == VerificationStatus::Failed && self.outcome == VerificationOutcome::Error
    }
}

// =============================================================================
// IDENTIFICATION & STEP RESULTS
// =============================================================================

/// A device fingerprint produced by an identification integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Name of the integration that produced it.
    pub source: String,
    #[serde(default)]
    pub props: Value,
}

impl Fingerprint {
    #[must_use]
    pub fn new(source: impl Into<String>, props: Value) -> Self {
        Self {
            source: source.into(),
            props,
        }
    }
}

/// Opaque result payload an executing integration submits for its step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepResponse(pub Value);

impl StepResponse {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised anywhere in the Dodgeball client.
///
/// - Transport variants describe a failed round trip to the verification service
/// - Integration variants describe a module that could not be loaded or run
/// - None of them is fatal to the host; the engine turns them into log records
///   or an `on_error` callback
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DodgeballError {
    /// The verification service could not be reached.
    #[error("Cannot connect to verification service: {0}")]
    ConnectionFailed(String),

    /// 401 - missing or rejected public key.
    #[error("Unauthorized: invalid or missing public key")]
    Unauthorized,

    /// 429 Too Many Requests.
    #[error("Rate limited: too many requests")]
    RateLimited,

    /// Non-success HTTP status other than the ones above.
    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    /// The response body could not be decoded.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// No factory is registered for the integration name.
    #[error("Unknown integration: {0}")]
    UnknownIntegration(String),

    /// The integration descriptor has neither a url nor inline text.
    #[error("No integration content: {0}")]
    MissingContent(String),

    /// Module source could not be acquired, loaded or configured.
    #[error("Integration {name} failed: {reason}")]
    Integration { name: String, reason: String },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl DodgeballError {
    /// Shorthand for an integration-scoped failure.
    pub fn integration(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Integration {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
