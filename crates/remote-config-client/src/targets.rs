//! Serde shapes for the TUF targets document embedded in poll responses.
//!
//! Only the fields the client consumes are modelled: the targets version, the
//! opaque backend state echoed back on the next request, and per-path hashes,
//! length and config version.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Hash algorithm whose digest drives change detection.
pub const SHA256: &str = "sha256";

/// Deserialised representation of a TUF targets document.
#[derive(Debug, Deserialize, Clone)]
pub struct TargetsDocument {
    /// Signed section containing targets and optional custom fields.
    pub signed: TargetsSigned,
}

/// Signed payload containing the per-target metadata plus custom data.
#[derive(Debug, Deserialize, Clone)]
pub struct TargetsSigned {
    /// Targets version, echoed back so the agent can compute deltas.
    #[serde(default)]
    pub version: u64,
    /// Mapping from target path to its metadata.
    #[serde(default)]
    pub targets: BTreeMap<String, TargetDescription>,
    /// Optional top-level custom section.
    #[serde(default)]
    pub custom: Option<TargetsSignedCustom>,
}

impl TargetsSigned {
    /// Returns the backend state the client must echo back, if any.
    pub fn opaque_backend_state(&self) -> Option<&str> {
        self.custom
            .as_ref()
            .and_then(|custom| custom.opaque_backend_state.as_deref())
    }
}

/// Top-level custom metadata embedded in a targets document.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TargetsSignedCustom {
    #[serde(default)]
    pub opaque_backend_state: Option<String>,
}

/// Metadata describing an individual target entry.
#[derive(Debug, Deserialize, Clone)]
pub struct TargetDescription {
    /// Advertised file length.
    #[serde(default)]
    pub length: u64,
    /// Content hashes keyed by algorithm (e.g., `sha256`).
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub custom: Option<TargetCustom>,
}

impl TargetDescription {
    /// Returns the SHA-256 digest advertised for the target.
    pub fn sha256(&self) -> Option<&str> {
        self.hashes.get(SHA256).map(String::as_str)
    }

    /// Returns the per-config version (`custom.v`), defaulting to zero.
    pub fn version(&self) -> u64 {
        self.custom.as_ref().map(|custom| custom.v).unwrap_or_default()
    }
}

/// Per-target custom section.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TargetCustom {
    #[serde(default)]
    pub v: u64,
}

/// Parses a targets document from raw bytes.
pub fn parse_targets_document_from_bytes(
    bytes: &[u8],
) -> Result<TargetsDocument, serde_json::Error> {
    serde_json::from_slice(bytes)
}
