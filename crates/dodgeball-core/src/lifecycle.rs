//! # Verification Lifecycle Decisions
//!
//! The pure half of the lifecycle engine: given a snapshot and the set of
//! steps already dispatched, decide whether to keep polling and where a
//! snapshot routes.
//!
//! ```text
//! SUBMITTED ──► POLLING ──► STEP_DISPATCH ──► POLLING ──► … ──► TERMINAL
//!                  │                                              ▲
//!                  └──────────────────────────────────────────────┘
//! ```
//!
//! WAITING and BLOCKED behave exactly like PENDING: the verification stays
//! in the POLLING/STEP_DISPATCH cycle until the outcome is decided.

use crate::dedup::StepDeduplicator;
use crate::types::{Verification, VerificationOutcome};
use std::fmt;

/// Where the engine currently is for a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Submitted,
    Polling,
    StepDispatch,
    Terminal(Route),
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => f.write_str("SUBMITTED"),
            Self::Polling => f.write_str("POLLING"),
            Self::StepDispatch => f.write_str("STEP_DISPATCH"),
            Self::Terminal(route) => write!(f, "TERMINAL({route:?})"),
        }
    }
}

/// How a snapshot is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// In progress: dispatch unseen steps, then poll again.
    Continue,
    /// APPROVED → `on_verified`.
    Verified,
    /// DENIED → `on_denied`.
    Denied,
    /// ERROR → `on_error`.
    Failed,
    /// No verification at all → `on_approved`.
    Approved,
    /// Outcome outside the known set → logged and surfaced as an error.
    Unrecognized,
}

impl Route {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Continue)
    }
}

/// Route a (possibly absent) verification snapshot.
#[must_use]
pub fn route(verification: Option<&Verification>) -> Route {
    let Some(verification) = verification else {
        return Route::Approved;
    };
    match verification.outcome {
        VerificationOutcome::Pending | VerificationOutcome::Waiting | VerificationOutcome::Blocked => {
            Route::Continue
        }
        VerificationOutcome::Approved => Route::Verified,
        VerificationOutcome::Denied => Route::Denied,
        VerificationOutcome::Error => Route::Failed,
        VerificationOutcome::Unknown => Route::Unrecognized,
    }
}

/// Keep waiting on the remote service?
///
/// True exactly when the outcome is still in progress **and** the snapshot
/// carries no step that has not been dispatched yet. An unseen step must be
/// dispatched before polling resumes.
#[must_use]
pub fn should_continue_polling(snapshot: &Verification, seen: &StepDeduplicator) -> bool {
    snapshot.outcome.is_in_progress() && !seen.has_unseen(&snapshot.next_steps)
}
