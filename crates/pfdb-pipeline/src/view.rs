//! What the pipeline hands back to callers.

use pfdb_core::{AnalyticsSnapshot, FreshnessDecision, Profile};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewSource {
    /// Stored snapshot, fresh enough that no refresh was attempted.
    Cache,
    /// Just acquired from upstream.
    Upstream,
    /// Stored snapshot returned because a refresh failed transiently.
    StaleFallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub profile: Profile,
    pub source: ViewSource,
    pub stale: bool,
    /// Gate decision evaluated after the request finished.
    pub freshness: FreshnessDecision,
}

impl ProfileView {
    pub(crate) fn new(profile: Profile, source: ViewSource, freshness: FreshnessDecision) -> Self {
        Self {
            profile,
            source,
            stale: source == ViewSource::StaleFallback,
            freshness,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsView {
    pub handle: String,
    pub analytics: AnalyticsSnapshot,
    pub stale: bool,
}
