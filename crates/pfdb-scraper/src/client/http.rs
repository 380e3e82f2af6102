//! The raw HTTP seam.
//!
//! [`HttpFetch`] is the only thing that touches the network. Production code
//! uses [`ReqwestFetcher`]; tests substitute scripted implementations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::ScraperError;

/// Status, `Retry-After` and body of one HTTP exchange. Non-2xx statuses are
/// returned here, not as errors; classification is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub retry_after_secs: Option<u64>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            retry_after_secs: None,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Performs a GET. Transport failures are errors; every HTTP status,
    /// including 4xx and 5xx, is an `Ok` response.
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, ScraperError>;
}

/// [`HttpFetch`] over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed (e.g., invalid TLS config).
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse, ScraperError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ScraperError::Timeout {
                    url: url.to_owned(),
                    timeout_secs: self.timeout_secs,
                }
            } else {
                ScraperError::Http(e)
            }
        })?;

        let status = response.status().as_u16();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            retry_after_secs,
            body,
        })
    }
}
