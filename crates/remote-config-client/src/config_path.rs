//! Parsing of Remote Config target paths.
//!
//! Paths follow `datadog/<org_id>/<product>/<config_id>/<name>` for
//! Datadog-managed configs and `employee/<product>/<config_id>/<name>` for
//! internal ones. The product segment selects the owning handler and the
//! config id stays stable across edits of the same logical config.

/// Enumerates the recognised Remote Config namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPathSource {
    /// Datadog-managed configs: `datadog/<org>/<product>/<config>/<file>`.
    Datadog,
    /// Internal employee configs: `employee/<product>/<config>/<file>`.
    Employee,
}

/// Structured view of a Remote Config target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPathInfo {
    pub source: ConfigPathSource,
    /// Present for Datadog-managed configs only.
    pub org_id: Option<String>,
    pub product: String,
    pub config_id: String,
    pub name: String,
}

/// Parses a target path into its structured representation.
pub fn parse_config_path(path: &str) -> Result<ConfigPathInfo, String> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(format!("config path '{path}' has an empty segment"));
    }
    match segments.as_slice() {
        ["datadog", org, product, config_id, name] => {
            if !org.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("orgID '{org}' in config path '{path}' is not numeric"));
            }
            Ok(ConfigPathInfo {
                source: ConfigPathSource::Datadog,
                org_id: Some((*org).to_string()),
                product: (*product).to_string(),
                config_id: (*config_id).to_string(),
                name: (*name).to_string(),
            })
        }
        ["employee", product, config_id, name] => Ok(ConfigPathInfo {
            source: ConfigPathSource::Employee,
            org_id: None,
            product: (*product).to_string(),
            config_id: (*config_id).to_string(),
            name: (*name).to_string(),
        }),
        ["datadog", ..] | ["employee", ..] => {
            Err(format!("config path '{path}' has wrong format"))
        }
        _ => Err(format!("config path '{path}' has unknown source")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_datadog_paths() {
        let info = parse_config_path("datadog/123/ASM_FEATURES/asm_features_activation/config")
            .expect("valid path");
        assert_eq!(info.source, ConfigPathSource::Datadog);
        assert_eq!(info.org_id.as_deref(), Some("123"));
        assert_eq!(info.product, "ASM_FEATURES");
        assert_eq!(info.config_id, "asm_features_activation");
        assert_eq!(info.name, "config");
    }

    #[test]
    fn parses_employee_paths() {
        let info = parse_config_path("employee/ASM_DD/blocked_ips/config").expect("valid path");
        assert_eq!(info.source, ConfigPathSource::Employee);
        assert_eq!(info.org_id, None);
        assert_eq!(info.product, "ASM_DD");
        assert_eq!(info.config_id, "blocked_ips");
    }

    #[test]
    fn org_id_is_any_run_of_digits() {
        let info = parse_config_path("datadog/123456789012345678901234567890/APM_TRACING/id/config")
            .expect("long org ids are valid");
        assert_eq!(
            info.org_id.as_deref(),
            Some("123456789012345678901234567890")
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        for path in [
            "",
            "datadog/abc/ASM/id/config",
            "datadog/+2/ASM/id/config",
            "datadog/-2/ASM/id/config",
            "datadog/1/ASM/id",
            "datadog/1/ASM/id/config/extra",
            "datadog/1//id/config",
            "employee/ASM/id",
            "other/1/ASM/id/config",
            "/datadog/1/ASM/id/config",
        ] {
            assert!(parse_config_path(path).is_err(), "{path} should be rejected");
        }
    }
}
