use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    /// `None` runs every command against the in-memory store.
    pub database_url: Option<String>,
    pub env: Environment,
    pub log_level: String,
    pub watchlist_path: PathBuf,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub upstream_base_url: String,
    pub upstream_app_id: String,
    pub scraper_request_timeout_secs: u64,
    pub scraper_user_agent: String,
    pub scraper_max_retries: u32,
    pub scraper_retry_backoff_base_ms: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_calls: usize,
    pub content_target: usize,
    pub freshness_min_interval_secs: i64,
    pub freshness_daily_quota: u32,
    pub quota_utc_offset_minutes: i32,
    pub mirror_enabled: bool,
    pub mirror_inter_item_delay_ms: u64,
    pub mirror_timeout_secs: u64,
    pub asset_root: PathBuf,
    pub asset_public_base_url: String,
    pub max_concurrent_handles: usize,
    pub watch_schedule: String,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("watchlist_path", &self.watchlist_path)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[redacted]"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("upstream_base_url", &self.upstream_base_url)
            .field("upstream_app_id", &self.upstream_app_id)
            .field(
                "scraper_request_timeout_secs",
                &self.scraper_request_timeout_secs,
            )
            .field("scraper_user_agent", &self.scraper_user_agent)
            .field("scraper_max_retries", &self.scraper_max_retries)
            .field(
                "scraper_retry_backoff_base_ms",
                &self.scraper_retry_backoff_base_ms,
            )
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("rate_limit_max_calls", &self.rate_limit_max_calls)
            .field("content_target", &self.content_target)
            .field(
                "freshness_min_interval_secs",
                &self.freshness_min_interval_secs,
            )
            .field("freshness_daily_quota", &self.freshness_daily_quota)
            .field("quota_utc_offset_minutes", &self.quota_utc_offset_minutes)
            .field("mirror_enabled", &self.mirror_enabled)
            .field(
                "mirror_inter_item_delay_ms",
                &self.mirror_inter_item_delay_ms,
            )
            .field("mirror_timeout_secs", &self.mirror_timeout_secs)
            .field("asset_root", &self.asset_root)
            .field("asset_public_base_url", &self.asset_public_base_url)
            .field("max_concurrent_handles", &self.max_concurrent_handles)
            .field("watch_schedule", &self.watch_schedule)
            .finish()
    }
}

impl AppConfig {
    /// Builds the freshness policy described by this configuration.
    #[must_use]
    pub fn freshness_policy(&self) -> crate::FreshnessPolicy {
        crate::FreshnessPolicy::new(
            chrono::Duration::seconds(self.freshness_min_interval_secs),
            self.freshness_daily_quota,
            self.quota_utc_offset_minutes,
        )
    }
}
