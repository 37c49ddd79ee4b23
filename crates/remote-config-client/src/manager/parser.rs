//! Turns one poll response into a set of change instructions.
//!
//! Planning is a pure function of the applied table and the response: it
//! borrows the table, validates everything up front and only returns the
//! instructions once the whole response is known to be consistent. A single
//! protocol violation rejects the response and leaves the caller's state alone.

use std::collections::HashSet;

use thiserror::Error;

use super::applied::{AppliedConfig, AppliedConfigTable};
use crate::config_path::parse_config_path;
use crate::protocol::ClientGetConfigsResponse;
use crate::targets::{parse_targets_document_from_bytes, TargetsDocument};

/// Protocol violations that reject a whole poll response.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The response body is not a valid poll response.
    #[error("malformed remote config response: {0}")]
    InvalidResponse(#[source] serde_json::Error),
    /// The signed targets document cannot be decoded.
    #[error("invalid targets metadata: {0}")]
    InvalidTargets(#[source] serde_json::Error),
    /// A client config has no entry in the targets document.
    #[error("Unable to find target for path {0}")]
    MissingTarget(String),
    /// A new or changed client config was shipped without its file.
    #[error("Unable to find file for path {0}")]
    MissingFile(String),
    /// A client config path does not follow the expected layout.
    #[error("Unable to parse path {path}: {reason}")]
    InvalidPath { path: String, reason: String },
    /// A target file is not valid JSON.
    #[error("invalid config file for path {path}: {source}")]
    InvalidFile {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Change instructions derived from one response.
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub to_unapply: Vec<AppliedConfig>,
    pub to_apply: Vec<AppliedConfig>,
    pub to_modify: Vec<AppliedConfig>,
    /// Present when the response carried a targets document.
    pub targets_version: Option<u64>,
    pub backend_client_state: Option<String>,
}

impl ConfigUpdate {
    /// Returns `true` when no config changes.
    pub fn has_no_changes(&self) -> bool {
        self.to_unapply.is_empty() && self.to_apply.is_empty() && self.to_modify.is_empty()
    }
}

/// Classifies every path of `response` against `applied`.
///
/// Paths in both with an unchanged `sha256` are left out entirely.
pub fn plan_update(
    applied: &AppliedConfigTable,
    response: &ClientGetConfigsResponse,
) -> Result<ConfigUpdate, ParseError> {
    if response.is_empty() {
        return Ok(ConfigUpdate::default());
    }

    let targets: Option<TargetsDocument> = if response.targets.is_empty() {
        None
    } else {
        Some(
            parse_targets_document_from_bytes(&response.targets)
                .map_err(ParseError::InvalidTargets)?,
        )
    };

    let client_configs: HashSet<&str> = response
        .client_configs
        .iter()
        .map(String::as_str)
        .collect();

    let mut update = ConfigUpdate {
        to_unapply: applied
            .iter()
            .filter(|config| !client_configs.contains(config.path.as_str()))
            .cloned()
            .collect(),
        ..Default::default()
    };

    let mut seen = HashSet::new();
    for path in &response.client_configs {
        if !seen.insert(path.as_str()) {
            continue;
        }
        let meta = targets
            .as_ref()
            .and_then(|document| document.signed.targets.get(path))
            .ok_or_else(|| ParseError::MissingTarget(path.clone()))?;
        let info = parse_config_path(path).map_err(|reason| ParseError::InvalidPath {
            path: path.clone(),
            reason,
        })?;

        let current = applied.get(path);
        if let Some(current) = current {
            if current.sha256() == meta.sha256() {
                continue;
            }
        }

        let file = response
            .target_file(path)
            .ok_or_else(|| ParseError::MissingFile(path.clone()))?;
        let content = if file.raw.is_empty() {
            None
        } else {
            Some(
                serde_json::from_slice(&file.raw).map_err(|source| ParseError::InvalidFile {
                    path: path.clone(),
                    source,
                })?,
            )
        };

        let config = AppliedConfig::new(
            path.clone(),
            info.product,
            info.config_id,
            meta.version(),
            meta.length,
            meta.hashes.clone(),
            content,
        );
        if current.is_some() {
            update.to_modify.push(config);
        } else {
            update.to_apply.push(config);
        }
    }

    if let Some(document) = &targets {
        update.targets_version = Some(document.signed.version);
        update.backend_client_state = Some(
            document
                .signed
                .opaque_backend_state()
                .unwrap_or_default()
                .to_string(),
        );
    }

    Ok(update)
}
