//! Canonical records shared by every crate in the workspace.
//!
//! These are the shapes the rest of the system stores and reasons about,
//! independent of which upstream endpoint produced the data. Upstream
//! payloads are converted into them by `pfdb_scraper::normalize`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Longest handle the upstream accepts.
pub const MAX_HANDLE_LEN: usize = 30;

/// Canonicalizes a user-supplied handle for lookup and storage.
///
/// Strips surrounding whitespace and one leading `@`, lower-cases the rest,
/// and rejects anything outside `[a-z0-9._]` or longer than
/// [`MAX_HANDLE_LEN`].
///
/// # Errors
///
/// Returns [`CoreError::InvalidHandle`] when the handle is empty, too long,
/// or contains characters the upstream never issues.
pub fn normalize_handle(raw: &str) -> Result<String, CoreError> {
    let trimmed = raw.trim();
    let handle = trimmed.strip_prefix('@').unwrap_or(trimmed).to_lowercase();

    let invalid = |reason: &str| CoreError::InvalidHandle {
        handle: raw.to_string(),
        reason: reason.to_string(),
    };

    if handle.is_empty() {
        return Err(invalid("handle is empty"));
    }
    if handle.chars().count() > MAX_HANDLE_LEN {
        return Err(invalid("handle is longer than 30 characters"));
    }
    if !handle
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_')
    {
        return Err(invalid("handle may only contain letters, digits, '.' and '_'"));
    }

    Ok(handle)
}

/// Lifecycle of the most recent acquisition attempt for a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStatus::Pending => write!(f, "pending"),
            FetchStatus::InProgress => write!(f, "in_progress"),
            FetchStatus::Completed => write!(f, "completed"),
            FetchStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Category of a content item. Assigned once during normalization and
/// never changed by later upserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Image,
    Carousel,
    Video,
    Reel,
}

impl ContentKind {
    /// `true` for kinds that carry view counts and durations.
    #[must_use]
    pub fn is_video_like(self) -> bool {
        matches!(self, ContentKind::Video | ContentKind::Reel)
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Image => write!(f, "image"),
            ContentKind::Carousel => write!(f, "carousel"),
            ContentKind::Video => write!(f, "video"),
            ContentKind::Reel => write!(f, "reel"),
        }
    }
}

/// A public profile on the upstream source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Upstream numeric user ID as a string. `None` only when the profile was
    /// recovered from a degraded source (HTML meta tags) that carries no ID.
    pub external_id: Option<String>,
    /// Lower-cased handle; see [`normalize_handle`].
    pub handle: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub external_url: Option<String>,
    pub avatar_source_url: Option<String>,
    pub avatar_mirrored_url: Option<String>,
    /// Source URL the current `avatar_mirrored_url` was produced from.
    pub avatar_last_mirrored_source_url: Option<String>,
    pub follower_count: u64,
    pub following_count: u64,
    pub content_count: u64,
    pub is_verified: bool,
    pub is_business: bool,
    pub is_private: bool,
    /// `false` once the upstream reports the handle gone. Profiles are never
    /// hard-deleted.
    pub is_active: bool,
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub fetch_status: FetchStatus,
    pub last_error: Option<String>,
    pub daily_fetch_count: u32,
    pub daily_quota_reset_time: Option<DateTime<Utc>>,
    /// Cached copy of the last computed snapshot.
    pub analytics: Option<AnalyticsSnapshot>,
}

impl Profile {
    /// A blank profile for `handle` with every counter at zero.
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            external_id: None,
            handle: handle.into(),
            display_name: None,
            bio: None,
            external_url: None,
            avatar_source_url: None,
            avatar_mirrored_url: None,
            avatar_last_mirrored_source_url: None,
            follower_count: 0,
            following_count: 0,
            content_count: 0,
            is_verified: false,
            is_business: false,
            is_private: false,
            is_active: true,
            last_fetch_time: None,
            fetch_status: FetchStatus::Pending,
            last_error: None,
            daily_fetch_count: 0,
            daily_quota_reset_time: None,
            analytics: None,
        }
    }

    /// `true` for records built from a source that carries no upstream ID
    /// (HTML meta tags). Such records lack flags and a real bio.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.external_id.is_none()
    }

    /// Copies upstream-sourced fields from `fresh` onto `self`.
    ///
    /// Mirror bookkeeping, fetch bookkeeping and the cached analytics are
    /// always kept. A degraded `fresh` only refreshes the counts, avatar and
    /// display name; the stored flags, bio and ID stay as they are.
    pub fn apply_upstream(&mut self, fresh: &Profile) {
        self.handle.clone_from(&fresh.handle);
        if fresh.display_name.is_some() {
            self.display_name.clone_from(&fresh.display_name);
        }
        if fresh.avatar_source_url.is_some() {
            self.avatar_source_url.clone_from(&fresh.avatar_source_url);
        }
        self.follower_count = fresh.follower_count;
        self.following_count = fresh.following_count;
        self.content_count = fresh.content_count;
        self.is_active = true;
        if fresh.is_degraded() {
            return;
        }

        self.external_id.clone_from(&fresh.external_id);
        self.display_name.clone_from(&fresh.display_name);
        self.bio.clone_from(&fresh.bio);
        self.external_url.clone_from(&fresh.external_url);
        self.is_verified = fresh.is_verified;
        self.is_business = fresh.is_business;
        self.is_private = fresh.is_private;
    }
}

/// A single post, carousel, video or reel owned by a [`Profile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Upstream media ID, stored as a string to avoid precision loss.
    pub external_id: String,
    /// Short public code used in permalinks (`/p/{shortcode}/`).
    pub shortcode: String,
    /// Handle of the owning profile.
    pub owner: String,
    pub kind: ContentKind,
    pub caption: Option<String>,
    /// Display image (cover frame for videos) on the upstream CDN.
    pub asset_source_url: Option<String>,
    pub asset_mirrored_url: Option<String>,
    /// Source URL the current `asset_mirrored_url` was produced from.
    pub last_mirrored_source_url: Option<String>,
    pub like_count: u64,
    pub comment_count: u64,
    /// Present for video and reel items only.
    pub view_count: Option<u64>,
    /// Seconds; present for video and reel items only.
    pub duration_secs: Option<f64>,
    pub posted_at: Option<DateTime<Utc>>,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
}

impl ContentItem {
    /// Permalink on the upstream site.
    #[must_use]
    pub fn permalink(&self) -> String {
        match self.kind {
            ContentKind::Reel => format!("https://www.instagram.com/reel/{}/", self.shortcode),
            _ => format!("https://www.instagram.com/p/{}/", self.shortcode),
        }
    }

    /// Merges a fresh sighting of the same item into the stored record.
    ///
    /// Engagement counters and the caption-derived fields come from `fresh`,
    /// including a caption that was removed upstream. The stored `kind` and
    /// mirror fields win. Other optional values missing from `fresh` keep
    /// their stored value.
    pub fn merge_from(&mut self, fresh: &ContentItem) {
        self.shortcode.clone_from(&fresh.shortcode);
        self.caption.clone_from(&fresh.caption);
        self.hashtags.clone_from(&fresh.hashtags);
        self.mentions.clone_from(&fresh.mentions);
        if fresh.asset_source_url.is_some() {
            self.asset_source_url.clone_from(&fresh.asset_source_url);
        }
        self.like_count = fresh.like_count;
        self.comment_count = fresh.comment_count;
        if fresh.view_count.is_some() {
            self.view_count = fresh.view_count;
        }
        if fresh.duration_secs.is_some() {
            self.duration_secs = fresh.duration_secs;
        }
        if fresh.posted_at.is_some() {
            self.posted_at = fresh.posted_at;
        }
    }
}

/// Number of items per [`ContentKind`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindBreakdown {
    pub image: u64,
    pub carousel: u64,
    pub video: u64,
    pub reel: u64,
}

impl KindBreakdown {
    pub fn record(&mut self, kind: ContentKind) {
        match kind {
            ContentKind::Image => self.image += 1,
            ContentKind::Carousel => self.carousel += 1,
            ContentKind::Video => self.video += 1,
            ContentKind::Reel => self.reel += 1,
        }
    }

    /// How many kinds have at least one item.
    #[must_use]
    pub fn distinct_kinds(&self) -> u64 {
        [self.image, self.carousel, self.video, self.reel]
            .iter()
            .filter(|&&n| n > 0)
            .count() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashtagCount {
    pub tag: String,
    pub count: u64,
}

/// Aggregates derived from a profile and its content. Always recomputed in
/// full; see [`crate::analytics::compute_analytics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub item_count: u64,
    pub total_likes: u64,
    pub total_comments: u64,
    pub total_views: u64,
    pub avg_likes: f64,
    pub avg_comments: f64,
    pub avg_views: f64,
    pub kind_breakdown: KindBreakdown,
    pub top_hashtags: Vec<HashtagCount>,
    /// Percent of followers engaging per item, two decimals.
    pub engagement_rate: f64,
    /// Bounded to `[0, 100]`.
    pub influence_score: f64,
}
