//! # Client Configuration
//!
//! The configuration surface of the client plus the fixed defaults it
//! starts from. Loading from files and the environment lives in the app
//! crate; this module only defines the shape and URL construction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default verification service origin.
pub const DEFAULT_API_URL: &str = "https://api.dodgeballhq.com/";

/// Default protocol version path segment.
pub const DEFAULT_API_VERSION: &str = "v1";

/// Fixed interval between two polls of the same verification.
pub const POLL_INTERVAL_MS: u64 = 1000;

/// Budget for resolving a batch of integrations.
pub const MAX_INTEGRATION_LOAD_TIMEOUT_MS: u64 = 2000;

/// Consecutive failed polls tolerated before a verification is given up.
pub const MAX_POLL_FAILURES: u32 = 5;

/// Header carrying the client's public key.
pub const PUBLIC_KEY_HEADER: &str = "Dodgeball-Public-Key";

/// Header carrying the resolved source identifier.
pub const SOURCE_ID_HEADER: &str = "Dodgeball-Source-Id";

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DodgeballConfig {
    /// Verification service origin.
    pub api_url: String,
    /// Protocol version segment appended to `api_url`.
    pub api_version: String,
    /// Keep the source identifier in memory only.
    pub disable_cookies: bool,
    /// Interval between polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Budget for batch integration loading, in milliseconds.
    pub load_timeout_ms: u64,
    /// Consecutive failed polls before resolving to an error.
    pub max_poll_failures: u32,
    /// File the source identifier is persisted to when cookies are enabled.
    pub source_id_path: Option<String>,
}

impl Default for DodgeballConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            disable_cookies: false,
            poll_interval_ms: POLL_INTERVAL_MS,
            load_timeout_ms: MAX_INTEGRATION_LOAD_TIMEOUT_MS,
            max_poll_failures: MAX_POLL_FAILURES,
            source_id_path: None,
        }
    }
}

impl DodgeballConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Versioned API base, always ending in `/`.
    #[must_use]
    pub fn api_base(&self) -> String {
        construct_api_url(&self.api_url, &self.api_version)
    }
}

/// Join an origin and a version into `{url}/{version}/`.
#[must_use]
pub fn construct_api_url(url: &str, version: &str) -> String {
    let mut base = url.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    format!("{base}{version}/")
}

/// Request headers for the verification service.
///
/// The source id header is only present once an identifier exists.
#[must_use]
pub fn construct_api_headers(public_key: &str, source_id: Option<&str>) -> BTreeMap<&'static str, String> {
    let mut headers = BTreeMap::new();
    headers.insert(PUBLIC_KEY_HEADER, public_key.to_string());
    if let Some(source_id) = source_id.filter(|s| !s.is_empty()) {
        headers.insert(SOURCE_ID_HEADER, source_id.to_string());
    }
    headers
}
