//! # Integration Registry & Module Fetching
//!
//! Turning a descriptor into an instance takes two separate steps:
//!
//! 1. A [`ModuleFetcher`] acquires the module source named by the
//!    descriptor's content (remote URL or inline text).
//! 2. The [`IntegrationRegistry`] hands that source to the factory
//!    registered under the descriptor's name.
//!
//! The loader only orchestrates the two; it never knows how bytes become
//! a module.

use super::{IntegrationConfig, SharedIntegration};
use crate::client::check_status;
use async_trait::async_trait;
use dodgeball_core::{DodgeballError, LibContent};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// MODULE SOURCE
// =============================================================================

/// Where a module's source was acquired from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    Url(String),
    Inline,
}

/// Acquired module source, ready for instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    pub name: String,
    pub origin: ModuleOrigin,
    pub body: String,
}

/// Resource-loading abstraction injected into the loader.
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    async fn fetch(&self, name: &str, content: &LibContent) -> Result<ModuleSource, DodgeballError>;
}

/// Fetches URL content over HTTP; inline text is used as-is.
#[derive(Clone, Default)]
pub struct HttpModuleFetcher {
    http: reqwest::Client,
}

impl HttpModuleFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ModuleFetcher for HttpModuleFetcher {
    async fn fetch(&self, name: &str, content: &LibContent) -> Result<ModuleSource, DodgeballError> {
        if let Some(url) = &content.url {
            let resp = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| DodgeballError::ConnectionFailed(format!("{url}: {e}")))?;
            let body = check_status(resp)
                .await?
                .text()
                .await
                .map_err(|e| DodgeballError::ParseError(e.to_string()))?;
            return Ok(ModuleSource {
                name: name.to_string(),
                origin: ModuleOrigin::Url(url.clone()),
                body,
            });
        }
        match &content.text {
            Some(text) => Ok(ModuleSource {
                name: name.to_string(),
                origin: ModuleOrigin::Inline,
                body: text.clone(),
            }),
            None => Err(DodgeballError::MissingContent(name.to_string())),
        }
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Constructor for one named integration.
pub type IntegrationFactory = Arc<
    dyn Fn(IntegrationConfig, &ModuleSource) -> Result<SharedIntegration, DodgeballError>
        + Send
        + Sync,
>;

/// Name → factory table, filled before the loader starts.
#[derive(Clone, Default)]
pub struct IntegrationRegistry {
    factories: BTreeMap<String, IntegrationFactory>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(IntegrationConfig, &ModuleSource) -> Result<SharedIntegration, DodgeballError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    /// Builder-style `register`.
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(IntegrationConfig, &ModuleSource) -> Result<SharedIntegration, DodgeballError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Construct a fresh instance for `config.name()`.
    pub fn instantiate(
        &self,
        config: IntegrationConfig,
        source: &ModuleSource,
    ) -> Result<SharedIntegration, DodgeballError> {
        let factory = self
            .factories
            .get(config.name())
            .ok_or_else(|| DodgeballError::UnknownIntegration(config.name().to_string()))?;
        factory(config, source)
    }
}

impl fmt::Debug for IntegrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
