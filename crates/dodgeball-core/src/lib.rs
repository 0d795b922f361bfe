//! # dodgeball-core
//!
//! The verification data model for the Dodgeball client - THE MODEL.
//!
//! This crate holds everything about a verification that can be decided
//! without touching the network: the snapshot types the service returns,
//! the record of dispatched steps, and the polling/routing decisions the
//! lifecycle engine acts on.
//!
//! ## Architectural Constraints
//!
//! - No async, no network dependencies (pure Rust)
//! - Never mutates a snapshot; the engine replaces snapshots wholesale
//! - Owns `DodgeballError`, the error type used by every layer

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod dedup;
pub mod lifecycle;
pub mod purpose;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    DodgeballError, Fingerprint, InitConfig, LibConfig, LibContent, StepResponse, Verification,
    VerificationOutcome, VerificationStatus, VerificationStep,
};

// =============================================================================
// RE-EXPORTS: Decisions
// =============================================================================

pub use dedup::StepDeduplicator;
pub use lifecycle::{LifecycleState, Route, route, should_continue_polling};
pub use purpose::{IntegrationPurpose, Purposes};

// =============================================================================
// RE-EXPORTS: Configuration
// =============================================================================

pub use config::{
    DEFAULT_API_URL, DEFAULT_API_VERSION, DodgeballConfig, MAX_INTEGRATION_LOAD_TIMEOUT_MS,
    MAX_POLL_FAILURES, POLL_INTERVAL_MS, PUBLIC_KEY_HEADER, SOURCE_ID_HEADER,
    construct_api_headers, construct_api_url,
};
