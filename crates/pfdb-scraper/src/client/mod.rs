//! Rate-limited client for the upstream's unofficial web and mobile endpoints.

mod http;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::ScraperError;
use crate::rate_limit::{retry_with_backoff, SlidingWindowLimiter};
use crate::types::{
    ClipsFeedResponse, MobileFeedResponse, ProfilePageResponse, TimelinePageResponse,
    WebProfileInfoResponse,
};

pub use http::{HttpFetch, HttpResponse, ReqwestFetcher};

/// Query hash of the persisted GraphQL query that pages a user's timeline.
pub const TIMELINE_QUERY_HASH: &str = "69cba40317214236af40e7efa697781d";

/// Anti-bot header value the web client sends alongside the app id.
const ASBD_ID: &str = "198387";

/// Knobs for [`UpstreamClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Origin without a trailing slash, e.g. `https://www.instagram.com`.
    pub base_url: String,
    pub app_id: String,
    pub request_timeout: Duration,
    /// Additional attempts after the first failure for transient errors.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl ClientSettings {
    #[must_use]
    pub fn from_config(config: &pfdb_core::AppConfig) -> Self {
        Self {
            base_url: config.upstream_base_url.clone(),
            app_id: config.upstream_app_id.clone(),
            request_timeout: Duration::from_secs(config.scraper_request_timeout_secs),
            max_retries: config.scraper_max_retries,
            backoff_base_ms: config.scraper_retry_backoff_base_ms,
        }
    }
}

/// Every upstream request goes through here.
///
/// Each attempt (retries included) is admitted by the shared
/// [`SlidingWindowLimiter`] and bounded by `request_timeout`. HTTP statuses
/// are classified into typed errors: 404 → [`ScraperError::NotFound`],
/// 401/403 → [`ScraperError::Forbidden`], 429 → [`ScraperError::RateLimited`],
/// anything else non-2xx → [`ScraperError::UnexpectedStatus`].
#[derive(Clone)]
pub struct UpstreamClient {
    http: Arc<dyn HttpFetch>,
    limiter: Arc<SlidingWindowLimiter>,
    settings: ClientSettings,
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl UpstreamClient {
    #[must_use]
    pub fn new(
        http: Arc<dyn HttpFetch>,
        limiter: Arc<SlidingWindowLimiter>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            http,
            limiter,
            settings,
        }
    }

    /// Builds a reqwest-backed client and a fresh limiter from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the reqwest client cannot be built.
    pub fn from_config(config: &pfdb_core::AppConfig) -> Result<Self, ScraperError> {
        let http = ReqwestFetcher::new(
            config.scraper_request_timeout_secs,
            &config.scraper_user_agent,
        )?;
        let limiter = SlidingWindowLimiter::new(
            Duration::from_secs(config.rate_limit_window_secs),
            config.rate_limit_max_calls,
        );
        Ok(Self::new(
            Arc::new(http),
            Arc::new(limiter),
            ClientSettings::from_config(config),
        ))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.settings.base_url
    }

    // -----------------------------------------------------------------------
    // Endpoints
    // -----------------------------------------------------------------------

    /// `GET /api/v1/users/web_profile_info/?username={handle}`.
    ///
    /// # Errors
    ///
    /// Any classified transport or status error, or
    /// [`ScraperError::Deserialize`] when the body is not the expected JSON.
    pub async fn web_profile_info(&self, handle: &str) -> Result<WebProfileInfoResponse, ScraperError> {
        let url = self.url("/api/v1/users/web_profile_info/", &[("username", handle)])?;
        self.get_json(&url, handle, "web_profile_info").await
    }

    /// `GET /{handle}/` with one of the `__a` query variants.
    ///
    /// # Errors
    ///
    /// Same as [`Self::web_profile_info`].
    pub async fn profile_page_json(
        &self,
        handle: &str,
        variant: &[(&str, &str)],
    ) -> Result<ProfilePageResponse, ScraperError> {
        let url = self.url(&format!("/{handle}/"), variant)?;
        self.get_json(&url, handle, "profile page json").await
    }

    /// `GET /{handle}/` as HTML.
    ///
    /// # Errors
    ///
    /// Any classified transport or status error.
    pub async fn profile_html(&self, handle: &str) -> Result<String, ScraperError> {
        let url = self.url(&format!("/{handle}/"), &[])?;
        let headers = vec![
            (
                "Accept".to_owned(),
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_owned(),
            ),
            ("Accept-Language".to_owned(), "en-US,en;q=0.5".to_owned()),
        ];
        let response = self.execute(&url, &headers).await?;
        Ok(response.text())
    }

    /// One page of the timeline GraphQL query.
    ///
    /// # Errors
    ///
    /// Same as [`Self::web_profile_info`].
    pub async fn timeline_page(
        &self,
        handle: &str,
        user_id: &str,
        first: u32,
        after: Option<&str>,
    ) -> Result<TimelinePageResponse, ScraperError> {
        let mut variables = serde_json::json!({ "id": user_id, "first": first });
        if let Some(cursor) = after {
            variables["after"] = serde_json::Value::String(cursor.to_owned());
        }
        let variables = variables.to_string();
        let url = self.url(
            "/graphql/query/",
            &[
                ("query_hash", TIMELINE_QUERY_HASH),
                ("variables", variables.as_str()),
            ],
        )?;
        self.get_json(&url, handle, "timeline query").await
    }

    /// `GET /api/v1/feed/user/{user_id}/`, paged by `max_id`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::web_profile_info`].
    pub async fn mobile_feed(
        &self,
        handle: &str,
        user_id: &str,
        count: u32,
        max_id: Option<&str>,
    ) -> Result<MobileFeedResponse, ScraperError> {
        let count = count.to_string();
        let mut query = vec![("count", count.as_str())];
        if let Some(max_id) = max_id {
            query.push(("max_id", max_id));
        }
        let url = self.url(&format!("/api/v1/feed/user/{user_id}/"), &query)?;
        self.get_json(&url, handle, "mobile feed").await
    }

    /// `GET /api/v1/clips/user/`, paged by `max_id`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::web_profile_info`].
    pub async fn clips_feed(
        &self,
        handle: &str,
        user_id: &str,
        page_size: u32,
        max_id: Option<&str>,
    ) -> Result<ClipsFeedResponse, ScraperError> {
        let page_size = page_size.to_string();
        let mut query = vec![
            ("target_user_id", user_id),
            ("page_size", page_size.as_str()),
        ];
        if let Some(max_id) = max_id {
            query.push(("max_id", max_id));
        }
        let url = self.url("/api/v1/clips/user/", &query)?;
        self.get_json(&url, handle, "clips feed").await
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        handle: &str,
        context: &str,
    ) -> Result<T, ScraperError> {
        let headers = self.json_headers(handle);
        let response = self.execute(url, &headers).await?;
        serde_json::from_slice::<T>(&response.body).map_err(|e| ScraperError::Deserialize {
            context: format!("{context} for {handle}"),
            source: e,
        })
    }

    /// Admission, timeout, retry and status classification for one logical
    /// request.
    async fn execute(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse, ScraperError> {
        let timeout = self.settings.request_timeout;
        retry_with_backoff(self.settings.max_retries, self.settings.backoff_base_ms, || async move {
            self.limiter.admit().await;
            tracing::debug!(url, "upstream request");
            let response = tokio::time::timeout(timeout, self.http.get(url, headers))
                .await
                .map_err(|_| ScraperError::Timeout {
                    url: url.to_owned(),
                    timeout_secs: timeout.as_secs(),
                })??;
            classify(url, response)
        })
        .await
    }

    fn json_headers(&self, handle: &str) -> Vec<(String, String)> {
        vec![
            ("Accept".to_owned(), "*/*".to_owned()),
            ("Accept-Language".to_owned(), "en-US,en;q=0.9".to_owned()),
            ("X-IG-App-ID".to_owned(), self.settings.app_id.clone()),
            ("X-ASBD-ID".to_owned(), ASBD_ID.to_owned()),
            ("X-Requested-With".to_owned(), "XMLHttpRequest".to_owned()),
            (
                "Referer".to_owned(),
                format!("{}/{handle}/", self.settings.base_url),
            ),
        ]
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<String, ScraperError> {
        let base = format!("{}{path}", self.settings.base_url);
        let mut url = reqwest::Url::parse(&base).map_err(|e| ScraperError::Malformed {
            context: "request url".to_owned(),
            reason: format!("\"{base}\" is not a valid URL: {e}"),
        })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url.into())
    }
}

fn classify(url: &str, response: HttpResponse) -> Result<HttpResponse, ScraperError> {
    match response.status {
        s if (200..300).contains(&s) => Ok(response),
        404 => Err(ScraperError::NotFound {
            url: url.to_owned(),
        }),
        401 | 403 => Err(ScraperError::Forbidden {
            status: response.status,
            url: url.to_owned(),
        }),
        429 => Err(ScraperError::RateLimited {
            retry_after_secs: response.retry_after_secs.unwrap_or(60),
        }),
        status => Err(ScraperError::UnexpectedStatus {
            status,
            url: url.to_owned(),
        }),
    }
}
