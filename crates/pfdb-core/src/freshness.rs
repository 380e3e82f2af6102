//! Staleness gate: decides whether a stored profile may be re-fetched.
//!
//! Two limits apply together: a minimum interval since the last successful
//! fetch, and a per-profile daily attempt quota that resets at local midnight
//! for a configured UTC offset. Staleness gates re-fetching only; a stored
//! profile can always be served.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;

use crate::model::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub min_interval: Duration,
    pub daily_quota: u32,
    pub utc_offset_minutes: i32,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(4), 6, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreshnessDecision {
    pub can_serve_cached: bool,
    pub can_refresh: bool,
    /// Earliest instant a refresh becomes allowed; `None` when allowed now.
    pub next_allowed_refresh: Option<DateTime<Utc>>,
}

impl FreshnessPolicy {
    #[must_use]
    pub fn new(min_interval: Duration, daily_quota: u32, utc_offset_minutes: i32) -> Self {
        Self {
            min_interval,
            daily_quota,
            utc_offset_minutes,
        }
    }

    #[must_use]
    pub fn decide(&self, profile: Option<&Profile>, now: DateTime<Utc>) -> FreshnessDecision {
        let Some(profile) = profile else {
            return FreshnessDecision {
                can_serve_cached: false,
                can_refresh: true,
                next_allowed_refresh: None,
            };
        };

        let interval_until = profile
            .last_fetch_time
            .map(|last| last + self.min_interval)
            .filter(|&at| now < at);

        let quota_until = if self.attempts_today(profile, now) >= self.daily_quota {
            Some(
                profile
                    .daily_quota_reset_time
                    .unwrap_or_else(|| self.next_reset(now)),
            )
        } else {
            None
        };

        let next_allowed_refresh = match (interval_until, quota_until) {
            (None, None) => None,
            (Some(at), None) | (None, Some(at)) => Some(at),
            (Some(a), Some(b)) => Some(a.max(b)),
        };

        FreshnessDecision {
            can_serve_cached: true,
            can_refresh: next_allowed_refresh.is_none(),
            next_allowed_refresh,
        }
    }

    /// Counts one fetch attempt against the daily quota, rolling the counter
    /// over once the stored reset instant has passed.
    pub fn record_fetch(&self, profile: &mut Profile, now: DateTime<Utc>) {
        match profile.daily_quota_reset_time {
            Some(reset) if now < reset => {
                profile.daily_fetch_count = profile.daily_fetch_count.saturating_add(1);
            }
            _ => {
                profile.daily_fetch_count = 1;
                profile.daily_quota_reset_time = Some(self.next_reset(now));
            }
        }
    }

    /// Attempts recorded in the current quota day.
    #[must_use]
    pub fn attempts_today(&self, profile: &Profile, now: DateTime<Utc>) -> u32 {
        match profile.daily_quota_reset_time {
            Some(reset) if now < reset => profile.daily_fetch_count,
            _ => 0,
        }
    }

    /// Next local midnight after `now`, expressed in UTC.
    #[must_use]
    pub fn next_reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let offset = Duration::minutes(i64::from(self.utc_offset_minutes));
        let local = now.naive_utc() + offset;
        let next_midnight = local.date().and_time(NaiveTime::MIN) + Duration::days(1);
        (next_midnight - offset).and_utc()
    }
}
