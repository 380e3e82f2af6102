pub mod analytics;
pub mod app_config;
pub mod config;
pub mod freshness;
pub mod model;
pub mod watchlist;

pub use analytics::{compute_analytics, influence_score};
pub use app_config::{AppConfig, Environment};
pub use config::{build_app_config, load_app_config, load_app_config_from_env};
pub use freshness::{FreshnessDecision, FreshnessPolicy};
pub use model::{
    normalize_handle, AnalyticsSnapshot, ContentItem, ContentKind, FetchStatus, HashtagCount,
    KindBreakdown, Profile,
};
pub use watchlist::{load_watchlist, WatchedHandle, WatchlistFile};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read watchlist file {path}: {source}")]
    WatchlistIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse watchlist file: {0}")]
    WatchlistParse(#[from] serde_yaml::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid handle \"{handle}\": {reason}")]
    InvalidHandle { handle: String, reason: String },
}
