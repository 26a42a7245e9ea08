//! HTTPS reporting client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Url};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::{ReportOutcome, ReportPayload, Reporter};

/// Default request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors constructing the client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid reporting endpoint '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct ReportBody<'a> {
    branch: &'a str,
}

/// Sends branch reports to the collection endpoint
///
/// The token travels only in the `Authorization` header. There is no retry:
/// each coalesced window gets one best-effort attempt.
pub struct HttpReporter {
    endpoint: Url,
    http: Client,
}

impl HttpReporter {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ClientError> {
        debug!(%endpoint, ?timeout, "HttpReporter::new: called");
        let endpoint = Url::parse(endpoint).map_err(|e| ClientError::InvalidUrl {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        let http = client_builder(timeout).build()?;
        Ok(Self { endpoint, http })
    }

    /// Use a preconfigured client (proxies, TLS roots, timeouts)
    pub fn with_client(endpoint: &str, http: Client) -> Result<Self, ClientError> {
        let endpoint = Url::parse(endpoint).map_err(|e| ClientError::InvalidUrl {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { endpoint, http })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Reporter for HttpReporter {
    async fn report(&self, payload: &ReportPayload) -> ReportOutcome {
        debug!(endpoint = %self.endpoint, branch = %payload.branch, "HttpReporter::report: called");
        let body = ReportBody {
            branch: payload.branch.as_str(),
        };

        let response = match self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&payload.token)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(
                    error = %e,
                    timeout = e.is_timeout(),
                    connect = e.is_connect(),
                    "HttpReporter::report: no response"
                );
                return ReportOutcome::Unreachable {
                    detail: describe_send_error(&e),
                };
            }
        };

        let status = response.status().as_u16();
        debug!(status, "HttpReporter::report: response received");
        ReportOutcome::from_status(status)
    }
}

/// Redirects are not followed: a 3xx is the endpoint's answer, not a delivery
fn client_builder(timeout: Duration) -> ClientBuilder {
    Client::builder().timeout(timeout).redirect(Policy::none())
}

fn describe_send_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        "connection failed".to_string()
    } else if e.is_builder() {
        "request could not be built".to_string()
    } else {
        e.to_string()
    }
}
