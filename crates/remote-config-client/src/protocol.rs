//! Wire models for the tracer-facing `/v0.7/config` endpoint.
//!
//! The agent speaks JSON to tracer clients: binary blobs (`targets`, target
//! file contents) travel as base64 strings, and older agents emit explicit
//! `null` for empty collections. The serde helpers below absorb both quirks so
//! the rest of the crate only deals with plain Rust values.

use serde::{Deserialize, Serialize};

/// Base64 serialization for a required `Vec<u8>` field.
pub(crate) mod serde_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = base64::engine::general_purpose::STANDARD.encode(value);
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// Treats an explicit `null` as the type's default value.
pub(crate) mod null_as_default {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        let opt = Option::<T>::deserialize(deserializer)?;
        Ok(opt.unwrap_or_default())
    }
}

/// Acknowledgement state of one applied configuration, encoded as the
/// integers the agent expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ApplyState {
    /// The owning handler has not reported back yet.
    Unacknowledged,
    /// The owning handler applied (or removed) the configuration.
    Acknowledged,
    /// The owning handler rejected the configuration.
    Error,
}

impl ApplyState {
    /// Returns the numeric wire value.
    pub const fn as_u8(self) -> u8 {
        match self {
            ApplyState::Unacknowledged => 1,
            ApplyState::Acknowledged => 2,
            ApplyState::Error => 3,
        }
    }
}

impl From<ApplyState> for u8 {
    fn from(state: ApplyState) -> Self {
        state.as_u8()
    }
}

impl TryFrom<u8> for ApplyState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, String> {
        match value {
            1 => Ok(ApplyState::Unacknowledged),
            2 => Ok(ApplyState::Acknowledged),
            3 => Ok(ApplyState::Error),
            other => Err(format!("unknown apply_state {other}")),
        }
    }
}

/// Request body posted to the agent on every poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientGetConfigsRequest {
    pub client: Client,
    pub cached_target_files: Vec<TargetFileMeta>,
}

/// Client descriptor carrying the reported state and identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Client {
    pub state: ClientState,
    pub id: String,
    pub products: Vec<String>,
    pub is_tracer: bool,
    pub client_tracer: ClientTracer,
    /// Base64 of the big-endian capability mask.
    pub capabilities: String,
}

/// Reported synchronisation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientState {
    pub root_version: u64,
    pub targets_version: u64,
    pub config_states: Vec<ConfigState>,
    pub has_error: bool,
    pub error: String,
    pub backend_client_state: String,
}

/// Per-config summary exposed to the agent for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigState {
    pub id: String,
    pub version: u64,
    pub product: String,
    pub apply_state: ApplyState,
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub apply_error: String,
}

/// Static identity of the process embedding the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientTracer {
    pub runtime_id: String,
    pub language: String,
    pub tracer_version: String,
    pub service: String,
    pub env: String,
    pub app_version: String,
    pub extra_services: Vec<String>,
    pub tags: Vec<String>,
}

/// Metadata of a target file the client already holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetFileMeta {
    pub path: String,
    pub length: u64,
    pub hashes: Vec<TargetFileHash>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetFileHash {
    pub algorithm: String,
    pub hash: String,
}

/// Response returned by the agent when something may have changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientGetConfigsResponse {
    /// Paths that must be applied after this update; anything else is stale.
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub client_configs: Vec<String>,
    /// Base64-encoded TUF targets document (JSON).
    #[serde(default, with = "serde_base64")]
    pub targets: Vec<u8>,
    /// Raw contents for the paths that need (re)fetching.
    #[serde(default, deserialize_with = "null_as_default::deserialize")]
    pub target_files: Vec<File>,
}

impl ClientGetConfigsResponse {
    /// Returns `true` when the agent had nothing to say.
    pub fn is_empty(&self) -> bool {
        self.client_configs.is_empty() && self.targets.is_empty() && self.target_files.is_empty()
    }

    /// Looks up the raw file shipped for `path`.
    pub fn target_file(&self, path: &str) -> Option<&File> {
        self.target_files.iter().find(|file| file.path == path)
    }
}

/// One target file shipped inline with a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    pub path: String,
    #[serde(default, with = "serde_base64")]
    pub raw: Vec<u8>,
}
