//! Environment-driven configuration for the Remote Config client.
//!
//! Mirrors the tracer defaults: remote configuration enabled, a five second
//! poll interval, and the agent reachable at `http://localhost:8126` unless
//! `DD_TRACE_AGENT_URL` or `DD_AGENT_HOST`/`DD_TRACE_AGENT_PORT` say otherwise.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use tracing::warn;

const ENV_ENABLED: &str = "DD_REMOTE_CONFIGURATION_ENABLED";
const ENV_POLL_INTERVAL: &str = "DD_REMOTE_CONFIG_POLL_INTERVAL_SECONDS";
const ENV_AGENT_URL: &str = "DD_TRACE_AGENT_URL";
const ENV_AGENT_HOST: &str = "DD_AGENT_HOST";
const ENV_AGENT_PORT: &str = "DD_TRACE_AGENT_PORT";
const ENV_SERVICE: &str = "DD_SERVICE";
const ENV_ENV: &str = "DD_ENV";
const ENV_VERSION: &str = "DD_VERSION";
const ENV_TAGS: &str = "DD_TAGS";
const ENV_GIT_REPOSITORY_URL: &str = "DD_GIT_REPOSITORY_URL";
const ENV_GIT_COMMIT_SHA: &str = "DD_GIT_COMMIT_SHA";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_AGENT_HOST: &str = "localhost";
const DEFAULT_AGENT_PORT: u16 = 8126;

/// Tag carrying the source repository, appended to the reported tracer tags.
pub const GIT_REPOSITORY_URL_TAG: &str = "git.repository_url";
/// Tag carrying the commit SHA, appended to the reported tracer tags.
pub const GIT_COMMIT_SHA_TAG: &str = "git.commit.sha";

/// Settings needed to build a [`crate::RemoteConfigClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Whether remote configuration is enabled. Defaults to `true`.
    pub enabled: bool,
    /// Delay between the end of one poll and the start of the next.
    pub poll_interval: Duration,
    /// Base URL of the trace agent (scheme, host and port).
    pub agent_url: String,
    pub service: String,
    pub env: String,
    pub app_version: String,
    /// `key:value` tags reported in the tracer block.
    pub tags: Vec<String>,
    pub repository_url: Option<String>,
    pub commit_sha: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            agent_url: format!("http://{DEFAULT_AGENT_HOST}:{DEFAULT_AGENT_PORT}"),
            service: String::new(),
            env: String::new(),
            app_version: String::new(),
            tags: Vec::new(),
            repository_url: None,
            commit_sha: None,
        }
    }
}

impl ClientConfig {
    /// Builds settings from the current process environment.
    pub fn from_os_env() -> Self {
        Self::from_env_iter(env::vars())
    }

    /// Builds settings from an iterator of key/value pairs (typically for tests).
    pub fn from_env_iter<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| map.get(key).and_then(|value| sanitize_non_empty(value));

        let enabled = parse_bool(map.get(ENV_ENABLED).map(String::as_str), true);
        let poll_interval = get(ENV_POLL_INTERVAL)
            .map(|raw| parse_poll_interval(&raw))
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        let agent_url = get(ENV_AGENT_URL)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| {
                let host = get(ENV_AGENT_HOST).unwrap_or_else(|| DEFAULT_AGENT_HOST.to_string());
                let port = get(ENV_AGENT_PORT)
                    .and_then(|port| port.parse::<u16>().ok())
                    .unwrap_or(DEFAULT_AGENT_PORT);
                agent_url_from_host(&host, port)
            });

        Self {
            enabled,
            poll_interval,
            agent_url,
            service: get(ENV_SERVICE).unwrap_or_default(),
            env: get(ENV_ENV).unwrap_or_default(),
            app_version: get(ENV_VERSION).unwrap_or_default(),
            tags: get(ENV_TAGS).map(|raw| parse_tags(&raw)).unwrap_or_default(),
            repository_url: get(ENV_GIT_REPOSITORY_URL),
            commit_sha: get(ENV_GIT_COMMIT_SHA),
        }
    }

    /// Tags reported to the agent, including git metadata when a repository is known.
    pub fn reported_tags(&self) -> Vec<String> {
        let mut tags = self.tags.clone();
        if let Some(repository_url) = &self.repository_url {
            tags.push(format!("{GIT_REPOSITORY_URL_TAG}:{repository_url}"));
            tags.push(format!(
                "{GIT_COMMIT_SHA_TAG}:{}",
                self.commit_sha.as_deref().unwrap_or_default()
            ));
        }
        tags
    }
}

fn agent_url_from_host(host: &str, port: u16) -> String {
    // Bare IPv6 literals need brackets inside a URL authority.
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}

fn parse_poll_interval(raw: &str) -> Duration {
    let interval = raw
        .parse::<f64>()
        .ok()
        .filter(|seconds| *seconds > 0.0)
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok());
    match interval {
        Some(interval) if interval < MIN_POLL_INTERVAL => {
            warn!(
                "remote-config: {ENV_POLL_INTERVAL} value {raw:?} is below {MIN_POLL_INTERVAL:?}, clamping"
            );
            MIN_POLL_INTERVAL
        }
        Some(interval) => interval,
        None => {
            warn!("remote-config: ignoring invalid {ENV_POLL_INTERVAL} value {raw:?}");
            DEFAULT_POLL_INTERVAL
        }
    }
}

/// Splits `DD_TAGS` on commas and whitespace, keeping `key:value` entries only.
fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|tag| {
            tag.split_once(':')
                .is_some_and(|(key, value)| !key.is_empty() && !value.is_empty())
        })
        .map(str::to_string)
        .collect()
}

/// Helper trimming whitespace and discarding empty values.
fn sanitize_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses boolean values from strings, falling back to the provided default.
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|s| s.trim().to_ascii_lowercase()) {
        Some(ref v) if ["1", "true", "t", "yes", "y"].contains(&v.as_str()) => true,
        Some(ref v) if ["0", "false", "f", "no", "n"].contains(&v.as_str()) => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_defaults() {
        let config = ClientConfig::from_env_iter::<Vec<(String, String)>, _, _>(vec![]);
        assert_eq!(config, ClientConfig::default());
        assert!(config.enabled);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.agent_url, "http://localhost:8126");
        assert!(config.reported_tags().is_empty());
    }

    #[test]
    fn agent_url_takes_precedence_over_host_and_port() {
        let config = ClientConfig::from_env_iter([
            (ENV_AGENT_URL, "http://agent:9126/"),
            (ENV_AGENT_HOST, "ignored"),
            (ENV_AGENT_PORT, "1234"),
        ]);
        assert_eq!(config.agent_url, "http://agent:9126");
    }

    #[test]
    fn agent_url_is_built_from_host_and_port() {
        let config =
            ClientConfig::from_env_iter([(ENV_AGENT_HOST, "datadog-agent"), (ENV_AGENT_PORT, "9000")]);
        assert_eq!(config.agent_url, "http://datadog-agent:9000");

        let ipv6 = ClientConfig::from_env_iter([(ENV_AGENT_HOST, "::1")]);
        assert_eq!(ipv6.agent_url, "http://[::1]:8126");

        let bad_port = ClientConfig::from_env_iter([(ENV_AGENT_PORT, "not-a-port")]);
        assert_eq!(bad_port.agent_url, "http://localhost:8126");
    }

    #[test]
    fn poll_interval_accepts_fractional_seconds_and_rejects_garbage() {
        let config = ClientConfig::from_env_iter([(ENV_POLL_INTERVAL, "0.5")]);
        assert_eq!(config.poll_interval, Duration::from_millis(500));

        for raw in ["0", "-1", "abc", "NaN", "inf", "1e30"] {
            let config = ClientConfig::from_env_iter([(ENV_POLL_INTERVAL, raw)]);
            assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL, "{raw}");
        }

        for raw in ["1e-12", "0.001"] {
            let config = ClientConfig::from_env_iter([(ENV_POLL_INTERVAL, raw)]);
            assert_eq!(config.poll_interval, MIN_POLL_INTERVAL, "{raw}");
        }
    }

    #[test]
    fn enabled_flag_honours_common_spellings() {
        assert!(!ClientConfig::from_env_iter([(ENV_ENABLED, "false")]).enabled);
        assert!(!ClientConfig::from_env_iter([(ENV_ENABLED, "0")]).enabled);
        assert!(ClientConfig::from_env_iter([(ENV_ENABLED, "Yes")]).enabled);
        assert!(ClientConfig::from_env_iter([(ENV_ENABLED, "maybe")]).enabled);
    }

    #[test]
    fn identity_fields_and_tags_are_read() {
        let config = ClientConfig::from_env_iter([
            (ENV_SERVICE, " checkout "),
            (ENV_ENV, "prod"),
            (ENV_VERSION, "1.2.3"),
            (ENV_TAGS, "team:payments, region:us1 invalid :nokey"),
            (ENV_GIT_REPOSITORY_URL, "https://github.com/example/repo"),
            (ENV_GIT_COMMIT_SHA, "abc123"),
        ]);
        assert_eq!(config.service, "checkout");
        assert_eq!(config.env, "prod");
        assert_eq!(config.app_version, "1.2.3");
        assert_eq!(config.tags, vec!["team:payments", "region:us1"]);
        assert_eq!(
            config.reported_tags(),
            vec![
                "team:payments",
                "region:us1",
                "git.repository_url:https://github.com/example/repo",
                "git.commit.sha:abc123",
            ]
        );
    }
}
