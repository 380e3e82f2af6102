//! The document store seam.
//!
//! Profiles live in one collection keyed by handle. Content lives in two
//! partitions keyed by `(owner, external_id)`: post-like and reel-like. An
//! item stays in the partition it was first written to.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use pfdb_core::{ContentItem, HashtagCount, Profile};
use serde::{Deserialize, Serialize};

use crate::DbError;

/// Largest page a listing will return.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Posts,
    Reels,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Posts, Partition::Reels];

    /// Routing rule for items not yet stored: a view count or any hashtag
    /// marks the item reel-like.
    #[must_use]
    pub fn sniff(item: &ContentItem) -> Self {
        if item.view_count.is_some() || !item.hashtags.is_empty() {
            Partition::Reels
        } else {
            Partition::Posts
        }
    }

    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            Partition::Posts => "content_posts",
            Partition::Reels => "content_reels",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Newest `posted_at` first; undated items last.
    #[default]
    Recent,
    Likes,
    Comments,
    Views,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recent" => Ok(SortKey::Recent),
            "likes" => Ok(SortKey::Likes),
            "comments" => Ok(SortKey::Comments),
            "views" => Ok(SortKey::Views),
            other => Err(format!(
                "unknown sort key '{other}' (expected recent, likes, comments or views)"
            )),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortKey::Recent => "recent",
            SortKey::Likes => "likes",
            SortKey::Comments => "comments",
            SortKey::Views => "views",
        })
    }
}

/// A 1-based page request over an owner's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentQuery {
    pub page: u32,
    pub page_size: u32,
    pub sort: SortKey,
}

impl Default for ContentQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 12,
            sort: SortKey::Recent,
        }
    }
}

impl ContentQuery {
    /// Clamps page to at least 1 and page size to `1..=MAX_PAGE_SIZE`.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, MAX_PAGE_SIZE),
            sort: self.sort,
        }
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentPage {
    pub items: Vec<ContentItem>,
    pub page: u32,
    pub page_size: u32,
    pub sort: SortKey,
    pub total: u64,
}

/// A stored item together with the partition holding it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredContent {
    pub partition: Partition,
    pub item: ContentItem,
}

/// Total order used by every listing: the sort key descending, then
/// `external_id` ascending.
pub(crate) fn compare_for(sort: SortKey, a: &ContentItem, b: &ContentItem) -> std::cmp::Ordering {
    let primary = match sort {
        SortKey::Recent => match (a.posted_at, b.posted_at) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        },
        SortKey::Likes => b.like_count.cmp(&a.like_count),
        SortKey::Comments => b.comment_count.cmp(&a.comment_count),
        SortKey::Views => b.view_count.unwrap_or(0).cmp(&a.view_count.unwrap_or(0)),
    };
    primary.then_with(|| a.external_id.cmp(&b.external_id))
}

/// Key-value document persistence for profiles and content.
///
/// Implementations must make `put_*` idempotent upserts and keep the mirror
/// fields field-scoped: the `update_*_mirror` calls touch only the two mirror
/// fields of the addressed record, and `put_*` never overwrites the mirror
/// fields of a record that is already stored.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_profile(&self, handle: &str) -> Result<Option<Profile>, DbError>;

    async fn find_profile_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Profile>, DbError>;

    /// Inserts or replaces the profile stored under `profile.handle`,
    /// keeping the stored avatar mirror fields.
    async fn put_profile(&self, profile: &Profile) -> Result<(), DbError>;

    /// Moves a profile and all of its content from handle `from` to `to`.
    async fn rename_owner(&self, from: &str, to: &str) -> Result<(), DbError>;

    /// Profiles whose handle starts with `prefix`, ordered by handle.
    async fn search_profiles(&self, prefix: &str, limit: usize) -> Result<Vec<Profile>, DbError>;

    async fn find_content(
        &self,
        owner: &str,
        external_id: &str,
    ) -> Result<Option<StoredContent>, DbError>;

    /// Inserts or replaces `item` in `partition`, keeping the stored asset
    /// mirror fields.
    async fn put_content(&self, partition: Partition, item: &ContentItem) -> Result<(), DbError>;

    async fn list_content(&self, owner: &str, query: ContentQuery) -> Result<ContentPage, DbError>;

    /// Every stored item for `owner`, newest first.
    async fn all_content(&self, owner: &str) -> Result<Vec<ContentItem>, DbError>;

    async fn content_ids(&self, owner: &str) -> Result<Vec<String>, DbError>;

    async fn count_content(&self, owner: &str) -> Result<u64, DbError>;

    /// Most frequent hashtags across both partitions, ties broken
    /// alphabetically.
    async fn top_hashtags(&self, owner: &str, limit: usize)
        -> Result<Vec<HashtagCount>, DbError>;

    /// Sets `asset_mirrored_url` and `last_mirrored_source_url` on one item.
    /// Returns `false` when the item does not exist.
    async fn update_content_mirror(
        &self,
        owner: &str,
        external_id: &str,
        mirrored_url: &str,
        source_url: &str,
    ) -> Result<bool, DbError>;

    /// Sets `avatar_mirrored_url` and `avatar_last_mirrored_source_url`.
    /// Returns `false` when the profile does not exist.
    async fn update_avatar_mirror(
        &self,
        handle: &str,
        mirrored_url: &str,
        source_url: &str,
    ) -> Result<bool, DbError>;
}
