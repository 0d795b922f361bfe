//! # Integration Contract
//!
//! An integration is a capability module the engine loads on demand. It
//! declares one or more [`IntegrationPurpose`]s and the engine calls the
//! matching hooks:
//!
//! | Purpose  | Hook        | When                                        |
//! |----------|-------------|---------------------------------------------|
//! | OBSERVE  | `observe`   | after identification, and per step          |
//! | IDENTIFY | `identify`  | during identification, and per step         |
//! | QUALIFY  | `qualify`   | per step                                    |
//! | EXECUTE  | `execute`   | per step, with a responder for the result   |
//!
//! Hooks for undeclared purposes are never called; their default bodies
//! do nothing. Instances are shared (`Arc`) between the loader's cache and
//! the engine, so stateful integrations keep their state behind interior
//! mutability.

mod registry;

pub use registry::{
    HttpModuleFetcher, IntegrationFactory, IntegrationRegistry, ModuleFetcher, ModuleOrigin,
    ModuleSource,
};

use crate::client::{StepSubmission, VerificationService};
use async_trait::async_trait;
use dodgeball_core::{
    DodgeballError, Fingerprint, IntegrationPurpose, LibConfig, Purposes, StepResponse,
    VerificationStep,
};
use std::sync::Arc;

/// Shared handle to a loaded integration.
pub type SharedIntegration = Arc<dyn Integration>;

// =============================================================================
// CONFIGURATION HANDED TO INTEGRATIONS
// =============================================================================

/// Descriptor plus the correlation id it was requested under.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationConfig {
    pub lib: LibConfig,
    /// Init request id for global integrations, step id for step-scoped ones.
    pub request_id: String,
}

impl IntegrationConfig {
    pub fn new(lib: LibConfig, request_id: impl Into<String>) -> Self {
        Self {
            lib,
            request_id: request_id.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.lib.name
    }
}

/// What a step-scoped hook knows about the verification it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub verification_id: String,
    pub source_id: Option<String>,
}

// =============================================================================
// STEP RESPONDER
// =============================================================================

/// Submits an executing integration's result for one step.
///
/// Bound to the step's `verification_step_id` when the step is dispatched.
#[derive(Clone)]
pub struct StepResponder {
    service: Arc<dyn VerificationService>,
    verification_id: String,
    verification_step_id: String,
    source_id: Option<String>,
}

impl StepResponder {
    pub fn new(
        service: Arc<dyn VerificationService>,
        verification_id: impl Into<String>,
        verification_step_id: impl Into<String>,
        source_id: Option<String>,
    ) -> Self {
        Self {
            service,
            verification_id: verification_id.into(),
            verification_step_id: verification_step_id.into(),
            source_id,
        }
    }

    pub fn verification_step_id(&self) -> &str {
        &self.verification_step_id
    }

    /// Send the result to the remote workflow.
    ///
    /// A failed submission is logged and returned to the integration; it
    /// never holds up the verification, which keeps polling regardless.
    pub async fn submit(&self, response: StepResponse) -> Result<(), DodgeballError> {
        let submission = StepSubmission {
            verification_id: self.verification_id.clone(),
            verification_step_id: self.verification_step_id.clone(),
            source_id: self.source_id.clone(),
            response,
        };
        let result = self.service.submit_step_response(&submission).await;
        match &result {
            Ok(()) => tracing::debug!(
                event = "step_response_submitted",
                verification_id = %self.verification_id,
                verification_step_id = %self.verification_step_id,
                "Step response submitted"
            ),
            Err(e) => tracing::warn!(
                event = "step_response_failed",
                verification_id = %self.verification_id,
                verification_step_id = %self.verification_step_id,
                error = %e,
                "Step response submission failed"
            ),
        }
        result
    }
}

// =============================================================================
// INTEGRATION TRAIT
// =============================================================================

/// A loadable capability module.
#[async_trait]
pub trait Integration: Send + Sync {
    /// Registry name; also the loader's cache key.
    fn name(&self) -> &str;

    /// Capabilities this module implements.
    fn purposes(&self) -> Purposes;

    /// True once `load` has completed for this instance.
    fn has_loaded(&self) -> bool;

    /// One-time acquisition of the module's own dependencies.
    async fn load(&self) -> Result<(), DodgeballError>;

    /// Apply the configuration the instance was constructed with.
    async fn configure(&self) -> Result<(), DodgeballError>;

    /// Apply a new descriptor to an already-loaded instance.
    async fn reconfigure(&self, config: IntegrationConfig) -> Result<(), DodgeballError>;

    /// OBSERVE: start telemetry for the given source identifier.
    async fn observe(&self, _source_id: &str) -> Result<(), DodgeballError> {
        Ok(())
    }

    /// IDENTIFY: produce a device fingerprint, if the module has one.
    async fn identify(&self) -> Result<Option<Fingerprint>, DodgeballError> {
        Ok(None)
    }

    /// QUALIFY: collect local risk signals for a verification.
    async fn qualify(&self, _context: &StepContext) -> Result<(), DodgeballError> {
        Ok(())
    }

    /// EXECUTE: run the step and submit its result through `responder`.
    async fn execute(
        &self,
        _step: &VerificationStep,
        _context: &StepContext,
        _responder: StepResponder,
    ) -> Result<(), DodgeballError> {
        Ok(())
    }
}

/// Integrations declaring `purpose`, in their original order.
pub fn filter_by_purpose(
    integrations: &[SharedIntegration],
    purpose: IntegrationPurpose,
) -> Vec<SharedIntegration> {
    integrations
        .iter()
        .filter(|integration| integration.purposes().contains(purpose))
        .cloned()
        .collect()
}
