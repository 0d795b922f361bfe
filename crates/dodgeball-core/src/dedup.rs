//! # Step Deduplicator
//!
//! Records which verification steps have been dispatched.
//!
//! A step id, once recorded, stays recorded for the lifetime of the
//! deduplicator. Snapshots polled moments apart routinely repeat the same
//! steps; only ids never recorded before pass the filter.

use crate::types::VerificationStep;
use std::collections::BTreeSet;

/// Set of dispatched step ids.
#[derive(Debug, Clone, Default)]
pub struct StepDeduplicator {
    seen: BTreeSet<String>,
}

impl StepDeduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps whose id has not been recorded, in their original order.
    #[must_use]
    pub fn filter_unseen(&self, steps: &[VerificationStep]) -> Vec<VerificationStep> {
        steps
            .iter()
            .filter(|step| !self.is_seen(&step.id))
            .cloned()
            .collect()
    }

    /// Record a step as dispatched.
    ///
    /// Returns `true` only for the call that recorded the id, so callers can
    /// use it as an atomic claim.
    pub fn mark_seen(&mut self, step: &VerificationStep) -> bool {
        self.seen.insert(step.id.clone())
    }

    #[must_use]
    pub fn is_seen(&self, step_id: &str) -> bool {
        self.seen.contains(step_id)
    }

    /// True if any step in the list has not been recorded.
    #[must_use]
    pub fn has_unseen(&self, steps: &[VerificationStep]) -> bool {
        steps.iter().any(|step| !self.is_seen(&step.id))
    }

    /// Number of recorded step ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
