//! Utilities for constructing agent responses used by integration tests.

use base64::Engine;
use serde_json::{json, Map, Value};

/// Feature-activation config path exercised by the scenarios.
pub const FEATURES_PATH: &str = "datadog/2/ASM_FEATURES/asm_features_activation/config";

/// Rules config path exercised by the scenarios.
pub const RULES_PATH: &str = "datadog/2/ASM_DD/recommended/config";

/// One config served by [`agent_response`].
pub struct ConfigFixture {
    pub path: &'static str,
    pub hash: &'static str,
    pub version: u64,
    /// `None` leaves the file out of `target_files` (already cached by the client).
    pub content: Option<Value>,
}

/// Builds the JSON body the agent returns from `/v0.7/config`.
pub fn agent_response(targets_version: u64, configs: &[ConfigFixture]) -> Value {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut targets = Map::new();
    let mut target_files = Vec::new();
    for config in configs {
        targets.insert(
            config.path.to_string(),
            json!({
                "length": 64,
                "hashes": { "sha256": config.hash },
                "custom": { "v": config.version }
            }),
        );
        if let Some(content) = &config.content {
            target_files.push(json!({
                "path": config.path,
                "raw": engine.encode(content.to_string()),
            }));
        }
    }
    let document = json!({
        "signed": {
            "_type": "targets",
            "version": targets_version,
            "custom": { "opaque_backend_state": format!("state-{targets_version}") },
            "targets": Value::Object(targets),
        }
    });
    json!({
        "client_configs": configs.iter().map(|config| config.path).collect::<Vec<_>>(),
        "targets": engine.encode(document.to_string()),
        "target_files": target_files,
    })
}
