//! Bookkeeping behind the outgoing client state.
//!
//! Versions, the opaque backend token and the parse error flag are committed
//! here; per-config summaries are derived from the applied table on demand so
//! late acknowledgements show up in the next request without extra plumbing.

use uuid::Uuid;

use crate::config::ClientConfig;
use crate::protocol::ClientTracer;

/// Schema version of the root metadata; the client never rotates roots.
pub const ROOT_VERSION: u64 = 1;

const TRACER_LANGUAGE: &str = "rust";

/// Static identity reported with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Identifier of this client instance, stable for its lifetime.
    pub client_id: String,
    pub runtime_id: String,
    pub language: String,
    pub tracer_version: String,
    pub service: String,
    pub env: String,
    pub app_version: String,
    pub tags: Vec<String>,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            client_id: Uuid::new_v4().to_string(),
            runtime_id: Uuid::new_v4().to_string(),
            language: TRACER_LANGUAGE.to_string(),
            tracer_version: env!("CARGO_PKG_VERSION").to_string(),
            service: String::new(),
            env: String::new(),
            app_version: String::new(),
            tags: Vec::new(),
        }
    }
}

impl ClientIdentity {
    /// Fresh identity carrying the service metadata from `config`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            service: config.service.clone(),
            env: config.env.clone(),
            app_version: config.app_version.clone(),
            tags: config.reported_tags(),
            ..Self::default()
        }
    }

    pub(crate) fn client_tracer(&self, extra_services: &[String]) -> ClientTracer {
        ClientTracer {
            runtime_id: self.runtime_id.clone(),
            language: self.language.clone(),
            tracer_version: self.tracer_version.clone(),
            service: self.service.clone(),
            env: self.env.clone(),
            app_version: self.app_version.clone(),
            extra_services: extra_services.to_vec(),
            tags: self.tags.clone(),
        }
    }
}

/// Values committed after each poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SyncState {
    pub(crate) targets_version: u64,
    pub(crate) backend_client_state: String,
    pub(crate) has_error: bool,
    pub(crate) error: String,
}

impl SyncState {
    pub(crate) fn record_error(&mut self, error: impl Into<String>) {
        self.has_error = true;
        self.error = error.into();
    }

    pub(crate) fn clear_error(&mut self) {
        self.has_error = false;
        self.error.clear();
    }

    pub(crate) fn commit(&mut self, targets_version: u64, backend_client_state: String) {
        self.targets_version = targets_version;
        self.backend_client_state = backend_client_state;
    }
}
