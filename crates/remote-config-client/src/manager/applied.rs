//! Applied-configuration table.
//!
//! The table is the single source of truth for "what is active right now".
//! Each entry owns a shared status cell so that asynchronous acknowledgements
//! can land after the dispatch call returned, even during a later poll.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::protocol::{ApplyState, ConfigState, TargetFileHash, TargetFileMeta};
use crate::targets::SHA256;

/// Apply state plus the error message reported alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyStatus {
    pub state: ApplyState,
    /// Empty unless `state` is [`ApplyState::Error`].
    pub error: String,
}

impl ApplyStatus {
    pub fn unacknowledged() -> Self {
        Self {
            state: ApplyState::Unacknowledged,
            error: String::new(),
        }
    }

    pub fn acknowledged() -> Self {
        Self {
            state: ApplyState::Acknowledged,
            error: String::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            state: ApplyState::Error,
            error: message.into(),
        }
    }
}

impl Default for ApplyStatus {
    fn default() -> Self {
        Self::unacknowledged()
    }
}

/// Shared, thread-safe status of one applied config.
#[derive(Debug, Clone, Default)]
pub(crate) struct StatusCell(Arc<Mutex<ApplyStatus>>);

impl StatusCell {
    pub(crate) fn get(&self) -> ApplyStatus {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn set(&self, status: ApplyStatus) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Records a handler verdict unless one was already recorded.
    ///
    /// Returns `false` when the verdict was ignored.
    pub(crate) fn resolve(&self, result: Result<(), String>) -> bool {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.state != ApplyState::Unacknowledged {
            return false;
        }
        *guard = match result {
            Ok(()) => ApplyStatus::acknowledged(),
            Err(message) => ApplyStatus::error(message),
        };
        true
    }
}

/// One unit of remote configuration considered active by this client.
#[derive(Debug, Clone)]
pub struct AppliedConfig {
    pub path: String,
    pub product: String,
    pub id: String,
    pub version: u64,
    pub length: u64,
    /// Digests keyed by algorithm; `sha256` drives change detection.
    pub hashes: BTreeMap<String, String>,
    /// Decoded JSON payload handed verbatim to the owning handler.
    pub file: Option<Value>,
    pub(crate) status: StatusCell,
}

impl AppliedConfig {
    /// Creates an unacknowledged entry.
    pub fn new(
        path: impl Into<String>,
        product: impl Into<String>,
        id: impl Into<String>,
        version: u64,
        length: u64,
        hashes: BTreeMap<String, String>,
        file: Option<Value>,
    ) -> Self {
        Self {
            path: path.into(),
            product: product.into(),
            id: id.into(),
            version,
            length,
            hashes,
            file,
            status: StatusCell::default(),
        }
    }

    pub fn sha256(&self) -> Option<&str> {
        self.hashes.get(SHA256).map(String::as_str)
    }

    /// Current apply status (live: reflects late acknowledgements).
    pub fn status(&self) -> ApplyStatus {
        self.status.get()
    }

    pub fn apply_state(&self) -> ApplyState {
        self.status().state
    }

    pub fn apply_error(&self) -> String {
        self.status().error
    }

    /// Immutable view handed to batch handlers.
    pub fn descriptor(&self) -> ConfigDescriptor {
        ConfigDescriptor {
            path: self.path.clone(),
            product: self.product.clone(),
            id: self.id.clone(),
            version: self.version,
            file: self.file.clone(),
        }
    }

    pub(crate) fn config_state(&self) -> ConfigState {
        let status = self.status();
        ConfigState {
            id: self.id.clone(),
            version: self.version,
            product: self.product.clone(),
            apply_state: status.state,
            apply_error: status.error,
        }
    }

    pub(crate) fn cached_target_file(&self) -> TargetFileMeta {
        TargetFileMeta {
            path: self.path.clone(),
            length: self.length,
            hashes: self
                .hashes
                .iter()
                .map(|(algorithm, hash)| TargetFileHash {
                    algorithm: algorithm.clone(),
                    hash: hash.clone(),
                })
                .collect(),
        }
    }
}

/// Read-only description of a config change.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDescriptor {
    pub path: String,
    pub product: String,
    pub id: String,
    pub version: u64,
    pub file: Option<Value>,
}

/// Path-keyed table of applied configurations (at most one entry per path).
#[derive(Debug, Default)]
pub struct AppliedConfigTable {
    entries: BTreeMap<String, AppliedConfig>,
}

impl AppliedConfigTable {
    pub fn get(&self, path: &str) -> Option<&AppliedConfig> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Inserts or replaces the entry for `config.path`.
    pub fn insert(&mut self, config: AppliedConfig) -> Option<AppliedConfig> {
        self.entries.insert(config.path.clone(), config)
    }

    pub fn remove(&mut self, path: &str) -> Option<AppliedConfig> {
        self.entries.remove(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AppliedConfig> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
