//! Transport used to exchange client state with the agent.
//!
//! The engine only needs "send this JSON, get back a status and a body", so
//! the exchange is abstracted behind [`Transport`]. [`HttpTransport`] is the
//! production implementation posting to the agent's `/v0.7/config` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use thiserror::Error;

/// Endpoint serving Remote Config to tracer clients.
pub const CONFIG_ENDPOINT: &str = "/v0.7/config";
/// Upper bound for a single poll round-trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Raw answer from the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Builds a `200 OK` response carrying `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            body: body.into(),
        }
    }

    /// Returns `true` when the agent has Remote Config disabled (404).
    pub fn is_disabled(&self) -> bool {
        self.status == StatusCode::NOT_FOUND.as_u16()
    }

    /// Returns `true` when the body carries no update (`""` or `{}`).
    pub fn is_not_modified(&self) -> bool {
        let body = String::from_utf8_lossy(&self.body);
        let body = body.trim();
        body.is_empty() || body == "{}"
    }
}

/// Failures while talking to the agent.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level issue (connection refused, timeout, TLS, ...).
    #[error("transport error: {0}")]
    Request(#[from] reqwest::Error),
    /// The agent answered with an error status.
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    /// The configured agent URL cannot be used.
    #[error("invalid agent url: {0}")]
    InvalidUrl(String),
}

impl TransportError {
    /// Returns the HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Request(err) => err.status().map(|status| status.as_u16()),
            TransportError::InvalidUrl(_) => None,
        }
    }
}

/// Request/response exchange with the agent.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the serialised client state and returns the agent's answer.
    async fn send(&self, payload: Vec<u8>) -> Result<TransportResponse, TransportError>;
}

/// HTTP transport posting JSON to `<agent_url>/v0.7/config`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    /// Builds a transport for the agent reachable at `agent_url`.
    pub fn new(agent_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let base = agent_url.trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(TransportError::InvalidUrl(agent_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{base}{CONFIG_ENDPOINT}"),
        })
    }

    /// Full URL requests are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: Vec<u8>) -> Result<TransportResponse, TransportError> {
        tracing::debug!(
            url = %self.url,
            body_len = payload.len(),
            "remote-config HTTP request"
        );
        let response = self
            .client
            .post(&self.url)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/json; charset=utf-8"),
            )
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?.to_vec();
        tracing::debug!(
            url = %self.url,
            status = %status,
            content_length = body.len(),
            "remote-config HTTP response"
        );

        // 404 means Remote Config is disabled on the agent; the caller treats it as "nothing new".
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(TransportResponse {
                status: status.as_u16(),
                body,
            });
        }
        Err(TransportError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}
