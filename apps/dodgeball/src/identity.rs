//! # Identity Resolution
//!
//! One-time, best-effort derivation of the source identifier:
//!
//! ```text
//! GET init ──► resolve_all(libs) ──► IDENTIFY integrations ──► POST identify
//!                                                                   │
//!            OBSERVE integrations ◄── store id ◄── release waiters ◄┘
//! ```
//!
//! Waiters attach to a single-resolution value ([`IdentityHandle`]); each
//! call to `wait` resolves exactly once, either immediately or when
//! identification completes. Abandoning the flow releases them with the
//! stored identifier instead.
//!
//! Only the run that wins [`IdentityHandle::complete`] persists its
//! identifier.

use crate::client::VerificationService;
use crate::integration::{SharedIntegration, filter_by_purpose};
use crate::loader::IntegrationLoader;
use crate::store::SourceIdStore;
use dodgeball_core::{DodgeballError, IntegrationPurpose};
use std::sync::Arc;
use tokio::sync::watch;

// =============================================================================
// IDENTITY HANDLE
// =============================================================================

/// Single-resolution source identifier shared by every waiter.
#[derive(Clone)]
pub struct IdentityHandle {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl Default for IdentityHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Resolved identifier, without waiting.
    pub fn source_id(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    pub fn is_identified(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Resolve the identifier. Only the first call has any effect.
    pub fn complete(&self, source_id: impl Into<String>) -> bool {
        let source_id = source_id.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(source_id);
            true
        })
    }

    /// Wait for identification and return the identifier.
    pub async fn wait(&self) -> String {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(resolved) => resolved.as_deref().unwrap_or_default().to_string(),
            // Sender dropped while `self` holds it: cannot happen.
            Err(_) => String::new(),
        }
    }

    /// `wait`, additionally handing the identifier to `callback` once.
    pub async fn wait_with<F>(&self, callback: F) -> String
    where
        F: FnOnce(&str) + Send,
    {
        let source_id = self.wait().await;
        callback(&source_id);
        source_id
    }
}

impl std::fmt::Debug for IdentityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityHandle")
            .field("source_id", &self.source_id())
            .finish()
    }
}

// =============================================================================
// DEVICE IDENTIFIER
// =============================================================================

/// Exchanges fingerprints for a source identifier and remembers it.
pub struct DeviceIdentifier {
    service: Arc<dyn VerificationService>,
    store: Arc<dyn SourceIdStore>,
}

impl DeviceIdentifier {
    pub fn new(service: Arc<dyn VerificationService>, store: Arc<dyn SourceIdStore>) -> Self {
        Self { service, store }
    }

    /// Previously stored identifier.
    pub fn stored(&self) -> Option<String> {
        self.store.load()
    }

    /// Collect fingerprints from `identifiers` and ask the service for an id.
    ///
    /// A failing identifier only loses its own fingerprint.
    pub async fn identify(
        &self,
        identifiers: &[SharedIntegration],
    ) -> Result<String, DodgeballError> {
        let mut fingerprints = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            match identifier.identify().await {
                Ok(Some(fingerprint)) => fingerprints.push(fingerprint),
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    integration = %identifier.name(),
                    error = %e,
                    "Identifier produced no fingerprint"
                ),
            }
        }

        let previous = self.store.load();
        self.service
            .identify(&fingerprints, previous.as_deref())
            .await
    }

    /// Persist `source_id` for the next session. An empty id is not kept.
    pub fn remember(&self, source_id: &str) {
        if source_id.is_empty() {
            return;
        }
        if let Err(e) = self.store.save(source_id) {
            tracing::warn!(error = %e, "Could not persist source id");
        }
    }
}

// =============================================================================
// IDENTITY RESOLVER
// =============================================================================

/// Runs the initialization flow and releases identity waiters.
pub struct IdentityResolver {
    service: Arc<dyn VerificationService>,
    loader: Arc<IntegrationLoader>,
    identifier: DeviceIdentifier,
    handle: IdentityHandle,
}

impl IdentityResolver {
    pub fn new(
        service: Arc<dyn VerificationService>,
        loader: Arc<IntegrationLoader>,
        identifier: DeviceIdentifier,
        handle: IdentityHandle,
    ) -> Self {
        Self {
            service,
            loader,
            identifier,
            handle,
        }
    }

    pub fn handle(&self) -> &IdentityHandle {
        &self.handle
    }

    /// Run identification once and return the source identifier.
    ///
    /// Never fails: an unreachable init endpoint means no integrations, and
    /// a failed identify call falls back to the stored identifier (or an
    /// empty one). Either way every waiter is released.
    pub async fn run(&self) -> String {
        if let Some(source_id) = self.handle.source_id() {
            return source_id;
        }

        let (libs, request_id) = match self.service.init_config().await {
            Ok(init) => (init.libs, init.request_id),
            Err(e) => {
                tracing::warn!(
                    event = "init_config_failed",
                    error = %e,
                    "Could not fetch initialization config, continuing without integrations"
                );
                (Vec::new(), String::new())
            }
        };

        let integrations = self.loader.resolve_all(&libs, &request_id).await;
        let identifiers = filter_by_purpose(&integrations, IntegrationPurpose::Identify);

        let (source_id, fresh) = match self.identifier.identify(&identifiers).await {
            Ok(source_id) => (source_id, true),
            Err(e) => {
                tracing::warn!(
                    event = "identify_failed",
                    error = %e,
                    "Device identification failed, using stored source id"
                );
                (self.identifier.stored().unwrap_or_default(), false)
            }
        };

        if !self.handle.complete(source_id.clone()) {
            // Another run finished first; keep its identifier.
            return self.handle.source_id().unwrap_or_default();
        }
        if fresh {
            self.identifier.remember(&source_id);
        }
        tracing::info!(
            event = "identified",
            integrations = integrations.len(),
            "Source identifier resolved"
        );

        for observer in filter_by_purpose(&integrations, IntegrationPurpose::Observe) {
            spawn_observe(observer, source_id.clone());
        }
        source_id
    }

    /// Release waiters without finishing the flow.
    ///
    /// Waiters get the stored identifier, or an empty one. Has no effect
    /// once identification has completed.
    pub fn release(&self) {
        let fallback = self.identifier.stored().unwrap_or_default();
        if self.handle.complete(fallback) {
            tracing::info!(
                event = "identity_released",
                "Identification abandoned, waiters released with the stored source id"
            );
        }
    }
}

/// Start an observer without waiting for it.
pub(crate) fn spawn_observe(observer: SharedIntegration, source_id: String) {
    tokio::spawn(async move {
        if let Err(e) = observer.observe(&source_id).await {
            tracing::warn!(integration = %observer.name(), error = %e, "Observer failed");
        }
    });
}

// =============================================================================
// TESTS
// =============================================================================
