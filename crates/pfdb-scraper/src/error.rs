use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("rate limited by upstream (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("access denied ({status}) for {url}")]
    Forbidden { status: u16, url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed payload from {context}: {reason}")]
    Malformed { context: String, reason: String },

    #[error("invalid record: {reason}")]
    Validation { reason: String },

    #[error("profile {handle} has no upstream user id; id-keyed content strategies unavailable")]
    MissingUserId { handle: String },

    #[error(transparent)]
    InvalidHandle(#[from] pfdb_core::CoreError),

    #[error("all {attempted} strategies failed for {handle}")]
    Exhausted { handle: String, attempted: usize },
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Forbidden,
    Transient,
    Validation,
}

impl ScraperError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            ScraperError::NotFound { .. } => ErrorClass::NotFound,
            ScraperError::Forbidden { .. } => ErrorClass::Forbidden,
            ScraperError::Validation { .. }
            | ScraperError::InvalidHandle(_)
            | ScraperError::MissingUserId { .. } => ErrorClass::Validation,
            ScraperError::Http(_)
            | ScraperError::Timeout { .. }
            | ScraperError::RateLimited { .. }
            | ScraperError::UnexpectedStatus { .. }
            | ScraperError::Deserialize { .. }
            | ScraperError::Malformed { .. }
            | ScraperError::Exhausted { .. } => ErrorClass::Transient,
        }
    }

    /// `true` for failures worth retrying inside a single strategy call.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            ScraperError::Http(e) => !e.is_builder() && !e.is_decode(),
            ScraperError::Timeout { .. } | ScraperError::RateLimited { .. } => true,
            ScraperError::UnexpectedStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        ScraperError::Validation {
            reason: reason.into(),
        }
    }
}
