//! # Source Identifier Storage
//!
//! Where the source identifier survives between runs. With cookies
//! disabled the identifier lives in memory only.

use dodgeball_core::DodgeballError;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// Persistence for the resolved source identifier.
pub trait SourceIdStore: Send + Sync {
    /// Previously stored identifier, if any.
    fn load(&self) -> Option<String>;

    fn save(&self, source_id: &str) -> Result<(), DodgeballError>;
}

/// Keeps the identifier for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemorySourceIdStore {
    source_id: Mutex<Option<String>>,
}

impl MemorySourceIdStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SourceIdStore for MemorySourceIdStore {
    fn load(&self) -> Option<String> {
        self.source_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, source_id: &str) -> Result<(), DodgeballError> {
        *self.source_id.lock().unwrap_or_else(PoisonError::into_inner) = Some(source_id.to_string());
        Ok(())
    }
}

/// Stores the identifier in a single-line text file.
#[derive(Debug, Clone)]
pub struct FileSourceIdStore {
    path: PathBuf,
}

impl FileSourceIdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceIdStore for FileSourceIdStore {
    fn load(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn save(&self, source_id: &str) -> Result<(), DodgeballError> {
        std::fs::write(&self.path, format!("{source_id}\n")).map_err(|e| {
            DodgeballError::IoError(format!(
                "Cannot write source id to '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}
