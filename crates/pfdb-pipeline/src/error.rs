use chrono::{DateTime, Utc};
use pfdb_scraper::{ErrorClass, ScraperError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid handle: {0}")]
    InvalidHandle(#[from] pfdb_core::CoreError),

    #[error("@{handle} does not exist upstream")]
    NotFound { handle: String },

    #[error("@{handle} is private or blocked")]
    Forbidden { handle: String },

    #[error("@{handle} could not be fetched and nothing is cached: {source}")]
    Unavailable {
        handle: String,
        #[source]
        source: ScraperError,
    },

    #[error(
        "refresh of @{handle} is throttled until {}",
        .next_allowed_refresh.map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339())
    )]
    Throttled {
        handle: String,
        next_allowed_refresh: Option<DateTime<Utc>>,
    },

    #[error("persistence failed: {0}")]
    Persistence(#[from] pfdb_db::DbError),
}

impl PipelineError {
    /// Maps an acquisition failure for `handle` onto the pipeline taxonomy.
    pub(crate) fn from_scraper(handle: &str, error: ScraperError) -> Self {
        match error {
            ScraperError::InvalidHandle(e) => PipelineError::InvalidHandle(e),
            e => match e.class() {
                ErrorClass::NotFound => PipelineError::NotFound {
                    handle: handle.to_string(),
                },
                ErrorClass::Forbidden => PipelineError::Forbidden {
                    handle: handle.to_string(),
                },
                ErrorClass::Transient | ErrorClass::Validation => PipelineError::Unavailable {
                    handle: handle.to_string(),
                    source: e,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn scraper_errors_map_by_class() {
        let nf = PipelineError::from_scraper("x", ScraperError::NotFound { url: "u".into() });
        assert!(matches!(nf, PipelineError::NotFound { .. }));

        let fb = PipelineError::from_scraper(
            "x",
            ScraperError::Forbidden {
                status: 403,
                url: "u".into(),
            },
        );
        assert!(matches!(fb, PipelineError::Forbidden { .. }));

        let tr = PipelineError::from_scraper(
            "x",
            ScraperError::RateLimited {
                retry_after_secs: 60,
            },
        );
        assert!(matches!(tr, PipelineError::Unavailable { .. }));
    }

    #[test]
    fn throttled_message_names_next_refresh() {
        let err = PipelineError::Throttled {
            handle: "natgeo".into(),
            next_allowed_refresh: Some(Utc.with_ymd_and_hms(2025, 1, 1, 4, 0, 0).unwrap()),
        };
        assert_eq!(
            err.to_string(),
            "refresh of @natgeo is throttled until 2025-01-01T04:00:00+00:00"
        );
    }
}
