//! Cascading fetch strategies.
//!
//! The upstream has no stable API, so both profile and content retrieval try
//! a fixed sequence of endpoints and fall through on failure. All calls share
//! the client's rate limiter.

mod content;
mod profile;

use std::collections::HashSet;

use pfdb_core::{normalize_handle, Profile};

use crate::client::UpstreamClient;
use crate::error::{ErrorClass, ScraperError};
use crate::normalize::{normalize_content, normalize_profile};
use crate::pagination::ContentAggregator;
use crate::types::RawContent;

pub use content::{
    ClipsFeed, ContentStrategy, MobileFeed, PrimaryTimeline, QueryVariants, StrategyPage,
    TimelineCursor, PAGE_SIZE,
};
pub use profile::ProfileStrategy;

/// Hard cap on pages per content strategy, whatever the cursors say.
pub const MAX_PAGES_PER_STRATEGY: usize = 10;

/// Result of [`FetchStrategyChain::fetch_profile`].
#[derive(Debug, Clone)]
pub struct ProfileFetch {
    pub profile: Profile,
    /// Which profile strategy produced it.
    pub strategy: &'static str,
    /// Timeline page embedded in the profile payload, if any.
    pub seed: Vec<RawContent>,
    pub seed_cursor: Option<String>,
}

impl ProfileFetch {
    /// Owner reference that lets the content chain reuse the embedded page.
    #[must_use]
    pub fn owner(&self) -> OwnerRef {
        OwnerRef {
            handle: self.profile.handle.clone(),
            user_id: self.profile.external_id.clone(),
            seed: self.seed.clone(),
            seed_cursor: self.seed_cursor.clone(),
        }
    }
}

/// What the content strategies need to know about the owner.
#[derive(Debug, Clone, Default)]
pub struct OwnerRef {
    pub handle: String,
    /// Upstream user ID; required by the id-keyed endpoints.
    pub user_id: Option<String>,
    pub seed: Vec<RawContent>,
    pub seed_cursor: Option<String>,
}

impl OwnerRef {
    /// Owner with no embedded page, e.g. for backfilling a stored profile.
    #[must_use]
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            handle: profile.handle.clone(),
            user_id: profile.external_id.clone(),
            seed: Vec::new(),
            seed_cursor: None,
        }
    }
}

pub struct FetchStrategyChain {
    client: UpstreamClient,
    profile_strategies: Vec<ProfileStrategy>,
    content_strategies: Vec<Box<dyn ContentStrategy>>,
    max_pages: usize,
}

impl std::fmt::Debug for FetchStrategyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStrategyChain")
            .field("client", &self.client)
            .field("profile_strategies", &self.profile_strategies)
            .field(
                "content_strategies",
                &self
                    .content_strategies
                    .iter()
                    .map(|s| s.name())
                    .collect::<Vec<_>>(),
            )
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

impl FetchStrategyChain {
    /// Chain with the standard strategy order.
    #[must_use]
    pub fn new(client: UpstreamClient) -> Self {
        Self::with_strategies(
            client,
            ProfileStrategy::ALL.to_vec(),
            vec![
                Box::new(PrimaryTimeline),
                Box::new(TimelineCursor),
                Box::new(MobileFeed),
                Box::new(QueryVariants::default()),
                Box::new(ClipsFeed),
            ],
        )
    }

    #[must_use]
    pub fn with_strategies(
        client: UpstreamClient,
        profile_strategies: Vec<ProfileStrategy>,
        content_strategies: Vec<Box<dyn ContentStrategy>>,
    ) -> Self {
        Self {
            client,
            profile_strategies,
            content_strategies,
            max_pages: MAX_PAGES_PER_STRATEGY,
        }
    }

    #[must_use]
    pub fn client(&self) -> &UpstreamClient {
        &self.client
    }

    /// Fetches and normalizes a profile.
    ///
    /// Strategies are tried in order; a failure falls through to the next.
    /// `NotFound` from the first strategy ends the cascade immediately.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::InvalidHandle`] before any I/O for malformed handles.
    /// - The last strategy error when every strategy failed.
    pub async fn fetch_profile(&self, handle: &str) -> Result<ProfileFetch, ScraperError> {
        let handle = normalize_handle(handle)?;
        let mut last_err = None;

        for (idx, strategy) in self.profile_strategies.iter().copied().enumerate() {
            let attempt = match strategy.fetch(&self.client, &handle).await {
                Ok(fetched) => {
                    normalize_profile(&fetched.raw, &handle).map(|profile| (profile, fetched))
                }
                Err(e) => Err(e),
            };

            match attempt {
                Ok((profile, fetched)) => {
                    tracing::info!(
                        handle = %handle,
                        strategy = strategy.name(),
                        seed_items = fetched.seed.len(),
                        "profile fetched"
                    );
                    return Ok(ProfileFetch {
                        profile,
                        strategy: strategy.name(),
                        seed: fetched.seed,
                        seed_cursor: fetched.seed_cursor,
                    });
                }
                Err(e) if idx == 0 && e.class() == ErrorClass::NotFound => {
                    tracing::info!(handle = %handle, strategy = strategy.name(), "profile not found");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(
                        handle = %handle,
                        strategy = strategy.name(),
                        error = %e,
                        "profile strategy failed, trying next"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(ScraperError::Exhausted {
            handle,
            attempted: 0,
        }))
    }

    /// Gathers up to `want` content items for `owner` that are not in
    /// `already_have`.
    ///
    /// # Errors
    ///
    /// - `NotFound` from the primary strategy.
    /// - The last strategy error when every strategy failed outright.
    pub async fn fetch_content<I>(
        &self,
        owner: &OwnerRef,
        already_have: I,
        want: usize,
    ) -> Result<Vec<pfdb_core::ContentItem>, ScraperError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut aggregator = ContentAggregator::new(already_have, want);
        let mut last_err = None;
        let mut any_succeeded = false;

        for (idx, strategy) in self.content_strategies.iter().enumerate() {
            if aggregator.is_satisfied() {
                break;
            }
            match self.run_strategy(strategy.as_ref(), owner, &mut aggregator).await {
                Ok(added) => {
                    any_succeeded = true;
                    tracing::debug!(
                        handle = %owner.handle,
                        strategy = strategy.name(),
                        added,
                        total = aggregator.len(),
                        "content strategy finished"
                    );
                }
                Err(e) if idx == 0 && e.class() == ErrorClass::NotFound => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        handle = %owner.handle,
                        strategy = strategy.name(),
                        error = %e,
                        "content strategy failed, trying next"
                    );
                    last_err = Some(e);
                }
            }
        }

        if !any_succeeded {
            if let Some(e) = last_err {
                return Err(e);
            }
        }

        let rejected = aggregator.rejected();
        let items = aggregator.into_items();
        tracing::info!(
            handle = %owner.handle,
            collected = items.len(),
            want,
            rejected,
            "content fetched"
        );
        Ok(items)
    }

    /// Pages through one strategy. An error on the first page fails the
    /// strategy; an error on a later page keeps what was gathered.
    async fn run_strategy(
        &self,
        strategy: &dyn ContentStrategy,
        owner: &OwnerRef,
        aggregator: &mut ContentAggregator,
    ) -> Result<usize, ScraperError> {
        let mut cursor = strategy.initial_cursor(owner);
        let mut seen_cursors: HashSet<String> = HashSet::new();
        let mut added_total = 0;

        for page_no in 0..self.max_pages {
            let page = match strategy
                .fetch_page(&self.client, owner, cursor.as_deref())
                .await
            {
                Ok(page) => page,
                Err(e @ (ScraperError::Deserialize { .. } | ScraperError::Malformed { .. })) => {
                    tracing::warn!(
                        handle = %owner.handle,
                        strategy = strategy.name(),
                        page = page_no,
                        error = %e,
                        "malformed page counted as empty"
                    );
                    break;
                }
                Err(e) if page_no == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        handle = %owner.handle,
                        strategy = strategy.name(),
                        page = page_no,
                        error = %e,
                        "pagination stopped early"
                    );
                    break;
                }
            };

            let normalized = page
                .items
                .iter()
                .map(|raw| normalize_content(raw, &owner.handle));
            let added = aggregator.absorb(strategy.name(), normalized);
            added_total += added;

            tracing::debug!(
                handle = %owner.handle,
                strategy = strategy.name(),
                page = page_no,
                received = page.items.len(),
                added,
                "content page"
            );

            // A page of already-stored items still leads to older content.
            if page.items.is_empty() || aggregator.is_satisfied() {
                break;
            }
            match page.next_cursor {
                Some(next) if seen_cursors.insert(next.clone()) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(added_total)
    }
}
