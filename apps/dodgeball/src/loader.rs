//! # Integration Loader
//!
//! Resolves descriptors to loaded, configured integration instances and
//! caches them by name.
//!
//! ## Resolution
//!
//! - Cached name: the existing instance is reconfigured with the new
//!   descriptor and returned. A failed reconfiguration yields `None`.
//! - New name: fetch source → instantiate → `load` (unless already loaded)
//!   → `configure` → cache. Any failure yields `None` and caches nothing.
//!
//! ## Concurrency
//!
//! Every name owns a slot guarded by an async mutex, so resolutions of the
//! same name run one after another (an instance is constructed at most
//! once) while different names resolve concurrently. The slot table itself
//! is only locked for map access, never across an await.
//!
//! A batch deadline only stops the wait. Resolutions already started run to
//! completion in their own tasks and still populate the cache.

use crate::integration::{
    IntegrationConfig, IntegrationRegistry, ModuleFetcher, SharedIntegration,
};
use dodgeball_core::{DodgeballError, LibConfig, MAX_INTEGRATION_LOAD_TIMEOUT_MS};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

type Slot = Arc<tokio::sync::Mutex<Option<SharedIntegration>>>;

/// Loads and caches integrations by name.
pub struct IntegrationLoader {
    registry: IntegrationRegistry,
    fetcher: Arc<dyn ModuleFetcher>,
    slots: Mutex<BTreeMap<String, Slot>>,
    load_timeout: Duration,
}

impl IntegrationLoader {
    pub fn new(registry: IntegrationRegistry, fetcher: Arc<dyn ModuleFetcher>) -> Self {
        Self {
            registry,
            fetcher,
            slots: Mutex::new(BTreeMap::new()),
            load_timeout: Duration::from_millis(MAX_INTEGRATION_LOAD_TIMEOUT_MS),
        }
    }

    /// Override the batch load budget.
    #[must_use]
    pub fn with_load_timeout(mut self, load_timeout: Duration) -> Self {
        self.load_timeout = load_timeout;
        self
    }

    pub fn load_timeout(&self) -> Duration {
        self.load_timeout
    }

    fn slot(&self, name: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(name.to_string()).or_default().clone()
    }

    // =========================================================================
    // SINGLE RESOLUTION
    // =========================================================================

    /// Resolve one descriptor to a ready instance.
    pub async fn resolve(
        &self,
        lib: &LibConfig,
        correlation_id: &str,
    ) -> Option<SharedIntegration> {
        let slot = self.slot(&lib.name);
        let mut cached = slot.lock().await;
        let config = IntegrationConfig::new(lib.clone(), correlation_id);

        if let Some(integration) = cached.as_ref() {
            tracing::info!(integration = %lib.name, "Integration already loaded, reconfiguring");
            return match integration.reconfigure(config).await {
                Ok(()) => Some(Arc::clone(integration)),
                Err(e) => {
                    tracing::error!(
                        event = "integration_reconfigure_failed",
                        integration = %lib.name,
                        error = %e,
                        "Error reconfiguring integration"
                    );
                    None
                }
            };
        }

        match self.instantiate(config).await {
            Ok(integration) => {
                *cached = Some(Arc::clone(&integration));
                Some(integration)
            }
            Err(e) => {
                tracing::error!(
                    event = "integration_load_failed",
                    integration = %lib.name,
                    error = %e,
                    "Error loading integration"
                );
                None
            }
        }
    }

    async fn instantiate(
        &self,
        config: IntegrationConfig,
    ) -> Result<SharedIntegration, DodgeballError> {
        let name = config.name().to_string();
        let content = config
            .lib
            .loadable_content()
            .cloned()
            .ok_or_else(|| DodgeballError::MissingContent(name.clone()))?;

        let source = self.fetcher.fetch(&name, &content).await?;
        let integration = self.registry.instantiate(config, &source)?;
        tracing::debug!(integration = %name, origin = ?source.origin, "Integration instantiated");

        if !integration.has_loaded() {
            tracing::info!(integration = %name, "Loading integration dependencies");
            integration.load().await?;
        }
        tracing::info!(integration = %name, "Configuring integration");
        integration.configure().await?;
        Ok(integration)
    }

    // =========================================================================
    // BATCH RESOLUTION
    // =========================================================================

    /// Resolve many descriptors concurrently within the load budget.
    ///
    /// Returns the instances that resolved, in descriptor order and one per
    /// name. Running out of time is not an error: whatever finished is kept.
    /// Each resolution runs as its own task, so a load still in flight at
    /// the deadline keeps going and lands in the cache when it completes.
    pub async fn resolve_all(
        self: &Arc<Self>,
        libs: &[LibConfig],
        correlation_id: &str,
    ) -> Vec<SharedIntegration> {
        let mut pending: FuturesUnordered<_> = libs
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, lib)| {
                let loader = Arc::clone(self);
                let correlation_id = correlation_id.to_string();
                tokio::spawn(async move { (index, loader.resolve(&lib, &correlation_id).await) })
            })
            .collect();

        let mut resolved: Vec<(usize, SharedIntegration)> = Vec::with_capacity(libs.len());
        let drained = tokio::time::timeout(self.load_timeout, async {
            while let Some(joined) = pending.next().await {
                match joined {
                    Ok((index, Some(integration))) => resolved.push((index, integration)),
                    Ok((_, None)) => {}
                    Err(e) => tracing::error!(
                        event = "integration_task_failed",
                        error = %e,
                        "Integration resolution task did not complete"
                    ),
                }
            }
        })
        .await;

        match drained {
            Ok(()) => tracing::info!(
                loaded = resolved.len(),
                requested = libs.len(),
                "All integrations resolved"
            ),
            Err(_) => tracing::error!(
                event = "integration_load_timeout",
                timeout_ms = self.load_timeout.as_millis() as u64,
                loaded = resolved.len(),
                requested = libs.len(),
                "Timeout loading integrations, the rest keep loading in the background"
            ),
        }

        resolved.sort_by_key(|(index, _)| *index);
        let mut names = std::collections::BTreeSet::new();
        resolved
            .into_iter()
            .map(|(_, integration)| integration)
            .filter(|integration| names.insert(integration.name().to_string()))
            .collect()
    }

    // =========================================================================
    // CACHE INSPECTION
    // =========================================================================

    /// Cached instance for `name`, if one finished loading.
    ///
    /// A name whose slot is busy resolving reports `None`.
    pub fn cached(&self, name: &str) -> Option<SharedIntegration> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(name).cloned()
        }?;
        slot.try_lock().ok().and_then(|guard| guard.clone())
    }

    /// Every cached instance, ordered by name.
    pub fn integrations(&self) -> Vec<SharedIntegration> {
        let slots: Vec<Slot> = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.values().cloned().collect()
        };
        slots
            .iter()
            .filter_map(|slot| slot.try_lock().ok().and_then(|guard| guard.clone()))
            .collect()
    }
}

impl std::fmt::Debug for IntegrationLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationLoader")
            .field("registry", &self.registry)
            .field("load_timeout", &self.load_timeout)
            .finish()
    }
}
