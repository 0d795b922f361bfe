//! # Integration Purposes
//!
//! Capability tags an integration declares. The engine only invokes the
//! hooks for purposes an integration declares, and always in the order
//! OBSERVE, IDENTIFY, QUALIFY, EXECUTE.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A capability an integration supports.
///
/// Variant order is the dispatch order, so `Ord` and iteration over
/// [`Purposes`] both yield hooks in the order the engine runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationPurpose {
    /// Fire-and-forget telemetry keyed by the source identifier.
    Observe,
    /// Produce or confirm a device identity.
    Identify,
    /// Collect local risk signals for a verification.
    Qualify,
    /// Run an active challenge and submit its result.
    Execute,
}

impl IntegrationPurpose {
    /// All purposes in dispatch order.
    pub const DISPATCH_ORDER: [Self; 4] = [Self::Observe, Self::Identify, Self::Qualify, Self::Execute];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Observe => "OBSERVE",
            Self::Identify => "IDENTIFY",
            Self::Qualify => "QUALIFY",
            Self::Execute => "EXECUTE",
        }
    }
}

impl fmt::Display for IntegrationPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of purposes a single integration declares.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Purposes(BTreeSet<IntegrationPurpose>);

impl Purposes {
    #[must_use]
    pub fn of(purposes: impl IntoIterator<Item = IntegrationPurpose>) -> Self {
        Self(purposes.into_iter().collect())
    }

    #[must_use]
    pub fn contains(&self, purpose: IntegrationPurpose) -> bool {
        self.0.contains(&purpose)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Declared purposes in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = IntegrationPurpose> + '_ {
        IntegrationPurpose::DISPATCH_ORDER
            .into_iter()
            .filter(|purpose| self.contains(*purpose))
    }
}

impl FromIterator<IntegrationPurpose> for Purposes {
    fn from_iter<I: IntoIterator<Item = IntegrationPurpose>>(iter: I) -> Self {
        Self::of(iter)
    }
}
