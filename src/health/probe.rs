//! Active health probe.
//!
//! # Design Decisions
//! - One GET per probe, no connection reuse, no compression
//! - Timeouts and connection errors are failures
//! - Status >= 500 is a failure, anything else is a success

use std::time::Duration;
use axum::body::Body;
use axum::http::{header, Request, StatusCode, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;
use url::Url;
use crate::health::state::ProbeOutcome;

const USER_AGENT: &str = "droplet-balancer-health-check";

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid health URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to build request: {0}")]
    Build(#[from] axum::http::Error),
    #[error("connection error: {0}")]
    Request(#[from] hyper_util::client::legacy::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("status code {0}")]
    Status(StatusCode),
}

impl ProbeError {
    fn invalid(url: &str, reason: impl ToString) -> Self {
        ProbeError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Probes a backend's health URL.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    uri: Uri,
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HealthProbe {
    /// Create a probe for `url`. Only plain `http` URLs are supported.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ProbeError> {
        let uri = parse_health_url(url)?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        connector.set_keepalive(None);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(connector);

        Ok(Self {
            uri,
            client,
            timeout,
        })
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Perform a single probe, returning the response status on success.
    pub async fn check(&self) -> Result<StatusCode, ProbeError> {
        let request = Request::get(self.uri.clone())
            .header(header::CONNECTION, "close")
            .header(header::USER_AGENT, USER_AGENT)
            .body(Body::empty())?;

        let response = match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(result) => result?,
            Err(_) => return Err(ProbeError::Timeout(self.timeout)),
        };

        let status = response.status();
        if status.as_u16() >= 500 {
            return Err(ProbeError::Status(status));
        }
        Ok(status)
    }
}

impl From<&Result<StatusCode, ProbeError>> for ProbeOutcome {
    fn from(result: &Result<StatusCode, ProbeError>) -> Self {
        match result {
            Ok(_) => ProbeOutcome::Passed,
            Err(_) => ProbeOutcome::Failed,
        }
    }
}

/// Validate a health URL and convert it for the HTTP client.
pub fn parse_health_url(url: &str) -> Result<Uri, ProbeError> {
    let parsed = Url::parse(url).map_err(|e| ProbeError::invalid(url, e))?;
    if parsed.scheme() != "http" {
        return Err(ProbeError::invalid(url, "scheme must be http"));
    }
    if parsed.host_str().is_none() {
        return Err(ProbeError::invalid(url, "missing host"));
    }
    parsed
        .as_str()
        .parse::<Uri>()
        .map_err(|e| ProbeError::invalid(url, e))
}
