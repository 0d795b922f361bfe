//! # Configuration Loading
//!
//! Builds a [`DodgeballConfig`] from an optional TOML file, then applies
//! environment overrides:
//!
//! - `DODGEBALL_API_URL` - verification service origin
//! - `DODGEBALL_API_VERSION` - protocol version segment
//! - `DODGEBALL_DISABLE_COOKIES` - `true`/`false` (also `1`/`0`, `yes`/`no`)
//! - `DODGEBALL_PUBLIC_KEY` - public key, when not given on the command line

use dodgeball_core::{DodgeballConfig, DodgeballError};
use std::path::Path;

pub const ENV_API_URL: &str = "DODGEBALL_API_URL";
pub const ENV_API_VERSION: &str = "DODGEBALL_API_VERSION";
pub const ENV_DISABLE_COOKIES: &str = "DODGEBALL_DISABLE_COOKIES";
pub const ENV_PUBLIC_KEY: &str = "DODGEBALL_PUBLIC_KEY";

/// Load configuration from `path` (if any) and the process environment.
pub fn load_config(path: Option<&Path>) -> Result<DodgeballConfig, DodgeballError> {
    let mut config = match path {
        Some(path) => parse_config_file(path)?,
        None => DodgeballConfig::default(),
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Parse a TOML configuration file.
pub fn parse_config_file(path: &Path) -> Result<DodgeballConfig, DodgeballError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        DodgeballError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
    })?;
    parse_config(&raw)
}

/// Parse TOML configuration text. Missing keys keep their defaults.
pub fn parse_config(raw: &str) -> Result<DodgeballConfig, DodgeballError> {
    toml::from_str(raw).map_err(|e| DodgeballError::Config(e.to_string()))
}

/// Apply overrides looked up through `lookup`; empty values are ignored.
pub fn apply_overrides<F>(config: &mut DodgeballConfig, lookup: F) -> Result<(), DodgeballError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get(ENV_API_URL) {
        config.api_url = url;
    }
    if let Some(version) = get(ENV_API_VERSION) {
        config.api_version = version;
    }
    if let Some(flag) = get(ENV_DISABLE_COOKIES) {
        config.disable_cookies = parse_flag(ENV_DISABLE_COOKIES, &flag)?;
    }
    Ok(())
}

/// Public key from the environment, if set and non-empty.
pub fn public_key_from_env() -> Option<String> {
    std::env::var(ENV_PUBLIC_KEY)
        .ok()
        .filter(|k| !k.is_empty())
}

fn parse_flag(key: &str, value: &str) -> Result<bool, DodgeballError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(DodgeballError::Config(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

// =============================================================================
// TESTS
// =============================================================================
