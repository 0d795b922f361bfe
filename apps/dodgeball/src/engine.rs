//! # Verification Lifecycle Engine
//!
//! Drives one verification from submission to a terminal outcome.
//!
//! ```text
//! SUBMITTED ─► STEP_DISPATCH ─► POLLING ─► STEP_DISPATCH ─► POLLING … ─► TERMINAL
//! ```
//!
//! - Polling is a fixed-interval loop; it stops as soon as the outcome is
//!   decided or a step nobody has dispatched shows up.
//! - Steps in a snapshot are dispatched one at a time, in order. Each step is
//!   claimed in the deduplicator before its integration is resolved, so no
//!   step runs twice however often it reappears.
//! - A failure inside one step is logged; the remaining steps still run.
//! - Terminal outcomes are delivered through [`VerificationHandler`].

use crate::client::VerificationService;
use crate::identity::{IdentityHandle, spawn_observe};
use crate::integration::{StepContext, StepResponder};
use crate::loader::IntegrationLoader;
use async_trait::async_trait;
use dodgeball_core::{
    DodgeballConfig, DodgeballError, IntegrationPurpose, LifecycleState, Route, StepDeduplicator,
    Verification, VerificationStep, route,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

// =============================================================================
// CALLBACK CONTRACT
// =============================================================================

/// Receives the terminal outcome of a verification.
#[async_trait]
pub trait VerificationHandler: Send + Sync {
    /// Outcome APPROVED.
    async fn on_verified(&self, verification: &Verification);

    /// Outcome DENIED.
    async fn on_denied(&self, verification: &Verification);

    /// Outcome ERROR, an unrecognized outcome, or polling gave up.
    async fn on_error(&self, message: &str);

    /// Called when there was no verification to track.
    async fn on_approved(&self, verification: Option<&Verification>);
}

/// Which callback fired, and with what.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Verified(Verification),
    Denied(Verification),
    Error(String),
    Approved,
}

// =============================================================================
// ENGINE
// =============================================================================

/// Polls verifications and dispatches their steps.
///
/// The deduplicator belongs to the engine instance: a step id dispatched
/// once is never dispatched again by the same engine.
pub struct VerificationEngine {
    service: Arc<dyn VerificationService>,
    loader: Arc<IntegrationLoader>,
    identity: IdentityHandle,
    seen: Mutex<StepDeduplicator>,
    poll_interval: Duration,
    max_poll_failures: u32,
}

impl VerificationEngine {
    pub fn new(
        service: Arc<dyn VerificationService>,
        loader: Arc<IntegrationLoader>,
        identity: IdentityHandle,
        config: &DodgeballConfig,
    ) -> Self {
        Self {
            service,
            loader,
            identity,
            seen: Mutex::new(StepDeduplicator::new()),
            poll_interval: config.poll_interval(),
            max_poll_failures: config.max_poll_failures.max(1),
        }
    }

    fn seen(&self) -> MutexGuard<'_, StepDeduplicator> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a step id has already been dispatched by this engine.
    pub fn is_seen(&self, step_id: &str) -> bool {
        self.seen().is_seen(step_id)
    }

    // =========================================================================
    // POLLING
    // =========================================================================

    /// Fetch the current snapshot of a verification.
    pub async fn poll(&self, verification_id: &str) -> Result<Verification, DodgeballError> {
        self.service.verification(verification_id).await
    }

    /// Keep waiting? False once the outcome is decided or an unseen step exists.
    pub fn should_continue_polling(&self, snapshot: &Verification) -> bool {
        dodgeball_core::should_continue_polling(snapshot, &self.seen())
    }

    /// Poll at the fixed interval until the snapshot needs attention.
    ///
    /// A failed poll is retried on the next tick; only `max_poll_failures`
    /// consecutive failures end the loop.
    async fn poll_until_actionable(
        &self,
        verification_id: &str,
    ) -> Result<Verification, DodgeballError> {
        let mut failures = 0u32;
        loop {
            match self.poll(verification_id).await {
                Ok(snapshot) => {
                    failures = 0;
                    if !self.should_continue_polling(&snapshot) {
                        return Ok(snapshot);
                    }
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        event = "poll_failed",
                        verification_id,
                        failures,
                        error = %e,
                        "Polling verification failed"
                    );
                    if failures >= self.max_poll_failures {
                        return Err(e);
                    }
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    // =========================================================================
    // LIFECYCLE DRIVER
    // =========================================================================

    /// Drive a verification to its terminal outcome and fire the callback.
    ///
    /// `None` stands for "nothing to verify" and resolves to `on_approved`.
    pub async fn handle_verification(
        &self,
        verification: Option<Verification>,
        handler: &dyn VerificationHandler,
    ) -> Resolution {
        let Some(mut current) = verification else {
            return self.resolve(None, handler).await;
        };
        tracing::debug!(
            verification_id = %current.id,
            state = %LifecycleState::Submitted,
            "Verification submitted"
        );

        while !route(Some(&current)).is_terminal() {
            tracing::debug!(
                verification_id = %current.id,
                outcome = %current.outcome,
                state = %LifecycleState::StepDispatch,
                "Dispatching unseen steps"
            );
            self.dispatch_steps(&current).await;

            tracing::debug!(
                verification_id = %current.id,
                state = %LifecycleState::Polling,
                "Polling verification"
            );
            current = match self.poll_until_actionable(&current.id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!(
                        event = "verification_abandoned",
                        verification_id = %current.id,
                        error = %message,
                        "Giving up on verification after repeated poll failures"
                    );
                    handler.on_error(&message).await;
                    return Resolution::Error(message);
                }
            };
        }

        self.resolve(Some(current), handler).await
    }

    /// Fire the callback for a decided (or absent) verification.
    async fn resolve(
        &self,
        verification: Option<Verification>,
        handler: &dyn VerificationHandler,
    ) -> Resolution {
        let decided = route(verification.as_ref());
        tracing::info!(
            event = "verification_resolved",
            verification_id = verification.as_ref().map(|v| v.id.as_str()).unwrap_or_default(),
            state = %LifecycleState::Terminal(decided),
            "Verification resolved"
        );

        match (decided, verification) {
            (Route::Verified, Some(verification)) => {
                handler.on_verified(&verification).await;
                Resolution::Verified(verification)
            }
            (Route::Denied, Some(verification)) => {
                handler.on_denied(&verification).await;
                Resolution::Denied(verification)
            }
            (Route::Failed, Some(verification)) => {
                let message = verification.error.unwrap_or_default();
                handler.on_error(&message).await;
                Resolution::Error(message)
            }
            (Route::Unrecognized, Some(verification)) => {
                tracing::error!(
                    event = "unrecognized_outcome",
                    verification_id = %verification.id,
                    "Verification outcome is not recognized"
                );
                let message = format!("Unrecognized verification outcome for {}", verification.id);
                handler.on_error(&message).await;
                Resolution::Error(message)
            }
            _ => {
                handler.on_approved(None).await;
                Resolution::Approved
            }
        }
    }

    // =========================================================================
    // STEP DISPATCH
    // =========================================================================

    /// Dispatch every step of the snapshot not dispatched before, in order.
    async fn dispatch_steps(&self, verification: &Verification) {
        let unseen = self.seen().filter_unseen(&verification.next_steps);
        for step in unseen {
            let claimed = self.seen().mark_seen(&step);
            if !claimed {
                continue;
            }
            if let Err(e) = self.dispatch_step(verification, &step).await {
                tracing::error!(
                    event = "step_dispatch_failed",
                    verification_id = %verification.id,
                    step_id = %step.id,
                    integration = %step.name,
                    error = %e,
                    "Error handling verification step"
                );
            }
        }
    }

    async fn dispatch_step(
        &self,
        verification: &Verification,
        step: &VerificationStep,
    ) -> Result<(), DodgeballError> {
        if step.name.is_empty() {
            tracing::debug!(step_id = %step.id, "Step names no integration, skipping");
            return Ok(());
        }
        tracing::info!(step_id = %step.id, integration = %step.name, "Handling verification step");

        let integration = self
            .loader
            .resolve(&step.to_lib_config(), &step.id)
            .await
            .ok_or_else(|| DodgeballError::integration(&step.name, "could not be resolved"))?;

        let source_id = self.identity.source_id();
        let context = StepContext {
            verification_id: verification.id.clone(),
            source_id: source_id.clone(),
        };

        let purposes = integration.purposes();
        if purposes.is_empty() {
            tracing::warn!(integration = %step.name, "Integration declares no purposes");
        }
        for purpose in purposes.iter() {
            match purpose {
                IntegrationPurpose::Observe => {
                    spawn_observe(Arc::clone(&integration), source_id.clone().unwrap_or_default());
                }
                IntegrationPurpose::Identify => {
                    integration.identify().await?;
                }
                IntegrationPurpose::Qualify => {
                    integration.qualify(&context).await?;
                }
                IntegrationPurpose::Execute => {
                    let responder = StepResponder::new(
                        Arc::clone(&self.service),
                        verification.id.clone(),
                        step.verification_step_id.clone(),
                        source_id.clone(),
                    );
                    integration.execute(step, &context, responder).await?;
                    tracing::debug!(step_id = %step.id, "Step executed");
                }
            }
        }
        Ok(())
    }
}
