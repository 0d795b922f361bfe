//! # Dodgeball Context
//!
//! The object callers hold. It wires the service client, loader, identity
//! resolution and lifecycle engine together and owns their lifetime:
//!
//! ```text
//! Dodgeball::builder(key).build() ──► track() ──► handle_verification()… ──► dispose()
//! ```
//!
//! Nothing is global: two contexts share no cache, no seen steps and no
//! identifier.

use crate::client::{DodgeballClient, VerificationService};
use crate::engine::{Resolution, VerificationEngine, VerificationHandler};
use crate::identity::{DeviceIdentifier, IdentityHandle, IdentityResolver};
use crate::integration::{
    HttpModuleFetcher, IntegrationRegistry, ModuleFetcher, SharedIntegration,
};
use crate::loader::IntegrationLoader;
use crate::store::{FileSourceIdStore, MemorySourceIdStore, SourceIdStore};
use dodgeball_core::{DodgeballConfig, Verification};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

// =============================================================================
// BUILDER
// =============================================================================

/// Assembles a [`Dodgeball`] context.
///
/// Anything not supplied falls back to the HTTP implementations and the
/// store selected by `disable_cookies`.
pub struct DodgeballBuilder {
    public_key: String,
    config: DodgeballConfig,
    registry: IntegrationRegistry,
    service: Option<Arc<dyn VerificationService>>,
    fetcher: Option<Arc<dyn ModuleFetcher>>,
    store: Option<Arc<dyn SourceIdStore>>,
}

impl DodgeballBuilder {
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            config: DodgeballConfig::default(),
            registry: IntegrationRegistry::new(),
            service: None,
            fetcher: None,
            store: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: DodgeballConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn registry(mut self, registry: IntegrationRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn service(mut self, service: Arc<dyn VerificationService>) -> Self {
        self.service = Some(service);
        self
    }

    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn ModuleFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn SourceIdStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Dodgeball {
        let http = reqwest::Client::new();
        let config = self.config;

        let service = self.service.unwrap_or_else(|| {
            Arc::new(DodgeballClient::with_http(
                http.clone(),
                &config,
                self.public_key.clone(),
            ))
        });
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HttpModuleFetcher::new(http)));
        let store = self.store.unwrap_or_else(|| default_store(&config));

        let loader = Arc::new(
            IntegrationLoader::new(self.registry, fetcher).with_load_timeout(config.load_timeout()),
        );
        let identity = IdentityHandle::new();
        let resolver = Arc::new(IdentityResolver::new(
            Arc::clone(&service),
            Arc::clone(&loader),
            DeviceIdentifier::new(Arc::clone(&service), store),
            identity.clone(),
        ));
        let engine = VerificationEngine::new(
            Arc::clone(&service),
            Arc::clone(&loader),
            identity.clone(),
            &config,
        );

        Dodgeball {
            public_key: self.public_key,
            config,
            loader,
            identity,
            resolver,
            engine,
            init_task: Mutex::new(None),
        }
    }
}

/// File-backed store when cookies are enabled and a path is configured.
fn default_store(config: &DodgeballConfig) -> Arc<dyn SourceIdStore> {
    match (&config.source_id_path, config.disable_cookies) {
        (Some(path), false) => Arc::new(FileSourceIdStore::new(path)),
        _ => Arc::new(MemorySourceIdStore::new()),
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// A client tracking verifications for one public key.
pub struct Dodgeball {
    public_key: String,
    config: DodgeballConfig,
    loader: Arc<IntegrationLoader>,
    identity: IdentityHandle,
    resolver: Arc<IdentityResolver>,
    engine: VerificationEngine,
    init_task: Mutex<Option<JoinHandle<String>>>,
}

impl Dodgeball {
    pub fn builder(public_key: impl Into<String>) -> DodgeballBuilder {
        DodgeballBuilder::new(public_key)
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn config(&self) -> &DodgeballConfig {
        &self.config
    }

    /// Start identity resolution in the background.
    ///
    /// Repeated calls while the first one is alive do nothing. Must be
    /// called from within a tokio runtime.
    pub fn track(&self) {
        let mut task = self.init_task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return;
        }
        let resolver = Arc::clone(&self.resolver);
        tracing::info!(api_url = %self.config.api_url, "Tracking started");
        *task = Some(tokio::spawn(async move { resolver.run().await }));
    }

    /// Run identity resolution inline and return the identifier.
    pub async fn initialize(&self) -> String {
        self.resolver.run().await
    }

    /// Source identifier, waiting for identification if necessary.
    pub async fn get_identity(&self) -> String {
        self.identity.wait().await
    }

    /// `get_identity` with a callback that fires once with the identifier.
    pub async fn get_identity_with<F>(&self, callback: F) -> String
    where
        F: FnOnce(&str) + Send,
    {
        self.identity.wait_with(callback).await
    }

    pub fn is_identified(&self) -> bool {
        self.identity.is_identified()
    }

    /// Track a verification to completion and fire the matching callback.
    pub async fn handle_verification(
        &self,
        verification: Option<Verification>,
        handler: &dyn VerificationHandler,
    ) -> Resolution {
        self.engine.handle_verification(verification, handler).await
    }

    /// Fetch a single snapshot without driving the lifecycle.
    pub async fn query_verification(
        &self,
        verification_id: &str,
    ) -> Result<Verification, dodgeball_core::DodgeballError> {
        self.engine.poll(verification_id).await
    }

    /// Integrations loaded so far, ordered by name.
    pub fn integrations(&self) -> Vec<SharedIntegration> {
        self.loader.integrations()
    }

    pub fn is_pending(&self, verification: &Verification) -> bool {
        verification.is_pending()
    }

    pub fn is_allowed(&self, verification: &Verification) -> bool {
        verification.is_allowed()
    }

    pub fn is_denied(&self, verification: &Verification) -> bool {
        verification.is_denied()
    }

    pub fn is_error(&self, verification: &Verification) -> bool {
        verification.is_error()
    }

    /// Stop background identification if it is still running.
    ///
    /// Identity waiters still pending get the stored identifier, or an
    /// empty one. Verifications already being handled are not interrupted.
    pub fn dispose(&self) {
        let task = self
            .init_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            self.resolver.release();
            tracing::debug!("Tracking disposed");
        }
    }
}

impl Drop for Dodgeball {
    fn drop(&mut self) {
        self.dispose();
    }
}
