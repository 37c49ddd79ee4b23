//! Lightweight diagnostics describing how polling has been going.
//!
//! Embedders can surface the snapshot in health endpoints or debug logs; the
//! engine itself never reads it back.

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::manager::PollOutcome;

/// Counters and last errors recorded after every poll.
#[derive(Debug, Default)]
pub struct RemoteConfigStatus {
    polls: AtomicU64,
    updates: AtomicU64,
    transport_errors: AtomicU64,
    parse_errors: AtomicU64,
    last_error: RwLock<Option<String>>,
}

impl RemoteConfigStatus {
    /// Creates a reference-counted status handle with zeroed counters.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records the outcome of one poll cycle.
    pub fn record(&self, outcome: &PollOutcome) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        match outcome {
            PollOutcome::Updated => {
                self.updates.fetch_add(1, Ordering::Relaxed);
                self.set_last_error(None);
            }
            PollOutcome::NotModified | PollOutcome::Disabled => self.set_last_error(None),
            PollOutcome::TransportFailed(err) => {
                self.transport_errors.fetch_add(1, Ordering::Relaxed);
                self.set_last_error(Some(err.clone()));
            }
            PollOutcome::ParseFailed(err) => {
                self.parse_errors.fetch_add(1, Ordering::Relaxed);
                self.set_last_error(Some(err.clone()));
            }
        }
    }

    /// Returns the error recorded by the most recent poll, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_last_error(&self, error: Option<String>) {
        *self
            .last_error
            .write()
            .unwrap_or_else(PoisonError::into_inner) = error;
    }

    /// Returns a status snapshot suitable for logging/exporting.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            last_error: self.last_error(),
        }
    }
}

/// Point-in-time copy of [`RemoteConfigStatus`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub polls: u64,
    pub updates: u64,
    pub transport_errors: u64,
    pub parse_errors: u64,
    pub last_error: Option<String>,
}

impl StatusSnapshot {
    /// Renders the snapshot as a JSON object.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("polls".into(), Value::from(self.polls));
        map.insert("updates".into(), Value::from(self.updates));
        map.insert("transportErrors".into(), Value::from(self.transport_errors));
        map.insert("parseErrors".into(), Value::from(self.parse_errors));
        map.insert(
            "lastError".into(),
            self.last_error
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        Value::Object(map)
    }
}
