use async_trait::async_trait;

use super::OwnerRef;
use crate::client::UpstreamClient;
use crate::error::ScraperError;
use crate::strategy::profile::PROFILE_PAGE_VARIANT;
use crate::types::RawContent;

/// Items requested per page from paginated endpoints.
pub const PAGE_SIZE: u32 = 12;

/// One page of raw content and the cursor for the next one.
#[derive(Debug, Clone, Default)]
pub struct StrategyPage {
    pub items: Vec<RawContent>,
    pub next_cursor: Option<String>,
}

/// A source of an owner's content.
///
/// The chain calls [`ContentStrategy::fetch_page`] with the cursor returned by
/// the previous page (starting from [`ContentStrategy::initial_cursor`]) until
/// the cursor runs out, a page adds nothing new, or the page cap is hit.
#[async_trait]
pub trait ContentStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn initial_cursor(&self, _owner: &OwnerRef) -> Option<String> {
        None
    }

    async fn fetch_page(
        &self,
        client: &UpstreamClient,
        owner: &OwnerRef,
        cursor: Option<&str>,
    ) -> Result<StrategyPage, ScraperError>;
}

fn require_user_id(owner: &OwnerRef) -> Result<&str, ScraperError> {
    owner
        .user_id
        .as_deref()
        .ok_or_else(|| ScraperError::MissingUserId {
            handle: owner.handle.clone(),
        })
}

/// Timeline edges embedded in the profile-info payload. Reuses the page
/// captured by `fetch_profile` when the owner carries one.
#[derive(Debug, Default)]
pub struct PrimaryTimeline;

#[async_trait]
impl ContentStrategy for PrimaryTimeline {
    fn name(&self) -> &'static str {
        "primary_timeline"
    }

    async fn fetch_page(
        &self,
        client: &UpstreamClient,
        owner: &OwnerRef,
        _cursor: Option<&str>,
    ) -> Result<StrategyPage, ScraperError> {
        if !owner.seed.is_empty() {
            return Ok(StrategyPage {
                items: owner.seed.clone(),
                next_cursor: None,
            });
        }

        let response = client.web_profile_info(&owner.handle).await?;
        let media = response
            .data
            .and_then(|d| d.user)
            .and_then(|u| u.edge_owner_to_timeline_media)
            .unwrap_or_default();
        Ok(StrategyPage {
            items: media
                .edges
                .into_iter()
                .map(|e| RawContent::Graph(e.node))
                .collect(),
            next_cursor: None,
        })
    }
}

/// Cursor pagination over the timeline GraphQL query, continuing after the
/// primary page when its cursor is known.
#[derive(Debug, Default)]
pub struct TimelineCursor;

#[async_trait]
impl ContentStrategy for TimelineCursor {
    fn name(&self) -> &'static str {
        "timeline_cursor"
    }

    fn initial_cursor(&self, owner: &OwnerRef) -> Option<String> {
        owner.seed_cursor.clone()
    }

    async fn fetch_page(
        &self,
        client: &UpstreamClient,
        owner: &OwnerRef,
        cursor: Option<&str>,
    ) -> Result<StrategyPage, ScraperError> {
        let user_id = require_user_id(owner)?;
        let media = client
            .timeline_page(&owner.handle, user_id, PAGE_SIZE, cursor)
            .await?
            .into_media()
            .ok_or_else(|| ScraperError::Malformed {
                context: self.name().to_owned(),
                reason: "response has no edge_owner_to_timeline_media".to_owned(),
            })?;
        let next_cursor = media.next_cursor();
        Ok(StrategyPage {
            items: media
                .edges
                .into_iter()
                .map(|e| RawContent::Graph(e.node))
                .collect(),
            next_cursor,
        })
    }
}

/// Mobile-style user feed, paged by `max_id`.
#[derive(Debug, Default)]
pub struct MobileFeed;

#[async_trait]
impl ContentStrategy for MobileFeed {
    fn name(&self) -> &'static str {
        "mobile_feed"
    }

    async fn fetch_page(
        &self,
        client: &UpstreamClient,
        owner: &OwnerRef,
        cursor: Option<&str>,
    ) -> Result<StrategyPage, ScraperError> {
        let user_id = require_user_id(owner)?;
        let feed = client
            .mobile_feed(&owner.handle, user_id, PAGE_SIZE, cursor)
            .await?;
        let next_cursor = feed.next_max_id.filter(|_| feed.more_available);
        Ok(StrategyPage {
            items: feed.items.into_iter().map(RawContent::Mobile).collect(),
            next_cursor,
        })
    }
}

/// Alternate query-string variants of the profile page JSON. Each variant
/// returns the same first page; later variants are only tried when earlier
/// ones fail.
#[derive(Debug)]
pub struct QueryVariants {
    variants: Vec<Vec<(&'static str, &'static str)>>,
}

impl Default for QueryVariants {
    fn default() -> Self {
        Self {
            variants: vec![
                vec![("__a", "1")],
                PROFILE_PAGE_VARIANT.to_vec(),
                vec![("__a", "1"), ("__d", "1")],
            ],
        }
    }
}

#[async_trait]
impl ContentStrategy for QueryVariants {
    fn name(&self) -> &'static str {
        "query_variants"
    }

    async fn fetch_page(
        &self,
        client: &UpstreamClient,
        owner: &OwnerRef,
        _cursor: Option<&str>,
    ) -> Result<StrategyPage, ScraperError> {
        let mut last_err = None;
        for variant in &self.variants {
            match client.profile_page_json(&owner.handle, variant).await {
                Ok(response) => {
                    let Some(media) = response
                        .graphql
                        .and_then(|g| g.user)
                        .and_then(|u| u.edge_owner_to_timeline_media)
                    else {
                        continue;
                    };
                    return Ok(StrategyPage {
                        items: media
                            .edges
                            .into_iter()
                            .map(|e| RawContent::Graph(e.node))
                            .collect(),
                        next_cursor: None,
                    });
                }
                Err(e) => {
                    tracing::debug!(handle = %owner.handle, ?variant, error = %e, "query variant failed");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(StrategyPage::default()),
        }
    }
}

/// Direct clips media feed, paged by `max_id`.
#[derive(Debug, Default)]
pub struct ClipsFeed;

#[async_trait]
impl ContentStrategy for ClipsFeed {
    fn name(&self) -> &'static str {
        "clips_feed"
    }

    async fn fetch_page(
        &self,
        client: &UpstreamClient,
        owner: &OwnerRef,
        cursor: Option<&str>,
    ) -> Result<StrategyPage, ScraperError> {
        let user_id = require_user_id(owner)?;
        let feed = client
            .clips_feed(&owner.handle, user_id, PAGE_SIZE, cursor)
            .await?;
        let next_cursor = feed
            .paging_info
            .filter(|p| p.more_available)
            .and_then(|p| p.max_id);
        Ok(StrategyPage {
            items: feed
                .items
                .into_iter()
                .filter_map(|c| c.media)
                .map(RawContent::Mobile)
                .collect(),
            next_cursor,
        })
    }
}
