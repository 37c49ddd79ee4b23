//! Shared fixtures for manager tests.

#![cfg(test)]

use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};

use super::{Action, ClientIdentity, ProductHandler, RemoteConfigManager};
use crate::protocol::{ClientGetConfigsResponse, File};

pub(crate) const FEATURES_PATH: &str = "datadog/2/ASM_FEATURES/asm_features_activation/config";
pub(crate) const RULES_PATH: &str = "datadog/2/ASM_DD/rules/config";
pub(crate) const DATA_PATH: &str = "datadog/2/ASM_DATA/blocked_ips/config";
pub(crate) const EMPLOYEE_PATH: &str = "employee/ASM_DD/override/config";

/// Manager with a deterministic identity.
pub(crate) fn test_manager() -> RemoteConfigManager {
    RemoteConfigManager::new(ClientIdentity {
        client_id: "client-id".into(),
        runtime_id: "runtime-id".into(),
        service: "svc".into(),
        env: "test".into(),
        ..ClientIdentity::default()
    })
}

/// Builds poll responses with explicit hashes.
#[derive(Debug, Default)]
pub(crate) struct ResponseBuilder {
    version: u64,
    backend_state: Option<String>,
    targets: Map<String, Value>,
    client_configs: Vec<String>,
    files: Vec<File>,
}

impl ResponseBuilder {
    pub(crate) fn new(targets_version: u64) -> Self {
        Self {
            version: targets_version,
            ..Self::default()
        }
    }

    pub(crate) fn backend_state(mut self, state: &str) -> Self {
        self.backend_state = Some(state.to_string());
        self
    }

    /// Adds a valid config shipped with its file.
    pub(crate) fn config(self, path: &str, hash: &str, version: u64, file: Value) -> Self {
        let raw = serde_json::to_vec(&file).unwrap_or_default();
        self.config_raw(path, hash, version, raw)
    }

    pub(crate) fn config_raw(mut self, path: &str, hash: &str, version: u64, raw: Vec<u8>) -> Self {
        self = self.unchanged(path, hash, version);
        self.files.push(File {
            path: path.to_string(),
            raw,
        });
        self
    }

    /// Adds a valid config whose file is not shipped.
    pub(crate) fn unchanged(mut self, path: &str, hash: &str, version: u64) -> Self {
        self.client_configs.push(path.to_string());
        self = self.target(path, hash, version);
        self
    }

    /// Adds target metadata without listing the path as a client config.
    pub(crate) fn target(mut self, path: &str, hash: &str, version: u64) -> Self {
        self.targets.insert(
            path.to_string(),
            json!({
                "length": hash.len(),
                "hashes": { "sha256": hash },
                "custom": { "v": version }
            }),
        );
        self
    }

    /// Lists a client config without any target metadata.
    pub(crate) fn orphan(mut self, path: &str) -> Self {
        self.client_configs.push(path.to_string());
        self
    }

    pub(crate) fn build(self) -> ClientGetConfigsResponse {
        let mut signed = json!({
            "_type": "targets",
            "version": self.version,
            "targets": Value::Object(self.targets),
        });
        if let Some(state) = self.backend_state {
            signed["custom"] = json!({ "opaque_backend_state": state });
        }
        ClientGetConfigsResponse {
            client_configs: self.client_configs,
            targets: json!({ "signed": signed }).to_string().into_bytes(),
            target_files: self.files,
        }
    }
}

/// One recorded handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub(crate) action: Action,
    pub(crate) id: String,
    pub(crate) file: Option<Value>,
}

/// Shared log of handler invocations.
#[derive(Debug, Clone, Default)]
pub(crate) struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("recorder lock").clone()
    }

    pub(crate) fn actions(&self) -> Vec<(Action, String)> {
        self.calls()
            .into_iter()
            .map(|call| (call.action, call.id))
            .collect()
    }

    fn push(&self, action: Action, file: Option<&Value>, id: &str) {
        self.calls.lock().expect("recorder lock").push(Call {
            action,
            id: id.to_string(),
            file: file.cloned(),
        });
    }

    /// Synchronous handler that records and succeeds.
    pub(crate) fn handler(&self) -> ProductHandler {
        let recorder = self.clone();
        ProductHandler::sync(move |action, file, id| {
            recorder.push(action, file, id);
            Ok(())
        })
    }

    /// Synchronous handler that records and fails with `message`.
    pub(crate) fn failing_handler(&self, message: &'static str) -> ProductHandler {
        let recorder = self.clone();
        ProductHandler::sync(move |action, file, id| {
            recorder.push(action, file, id);
            Err(message.into())
        })
    }
}
