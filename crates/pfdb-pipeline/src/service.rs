//! Request orchestration for one handle at a time.
//!
//! The staleness gate runs against the stored snapshot first. Only when it
//! allows a refresh does anything reach the upstream: profile chain, content
//! chain, upsert, analytics over everything stored, then a detached mirror
//! run. Transient failures with a stored snapshot fall back to that snapshot
//! marked stale.
//!
//! Acquisition runs on its own task, so a caller that stops waiting does not
//! interrupt persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pfdb_core::{
    compute_analytics, normalize_handle, AppConfig, FetchStatus, FreshnessPolicy, HashtagCount,
    Profile,
};
use pfdb_db::{upsert_content, upsert_profile, ContentPage, ContentQuery, DbError, DocumentStore};
use pfdb_scraper::{ErrorClass, FetchStrategyChain, OwnerRef, ScraperError};

use crate::mirror::{MirrorDispatcher, MirrorReport};
use crate::view::{AnalyticsView, ProfileView, ViewSource};
use crate::PipelineError;

#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    /// Content items requested per refresh.
    pub content_target: usize,
    pub freshness: FreshnessPolicy,
    /// Dispatch a background mirror run after every successful acquisition.
    pub auto_mirror: bool,
}

impl ServiceSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            content_target: config.content_target,
            freshness: config.freshness_policy(),
            auto_mirror: config.mirror_enabled,
        }
    }
}

/// The pipeline's public operations. Clones share the chain, store and
/// mirror dispatcher.
#[derive(Clone)]
pub struct ProfileService {
    inner: Arc<Inner>,
}

struct Inner {
    chain: FetchStrategyChain,
    store: Arc<dyn DocumentStore>,
    mirror: Arc<MirrorDispatcher>,
    settings: ServiceSettings,
}

impl std::fmt::Debug for ProfileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileService")
            .field("chain", &self.inner.chain)
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl ProfileService {
    #[must_use]
    pub fn new(
        chain: FetchStrategyChain,
        store: Arc<dyn DocumentStore>,
        mirror: Arc<MirrorDispatcher>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                chain,
                store,
                mirror,
                settings,
            }),
        }
    }

    #[must_use]
    pub fn mirror(&self) -> &MirrorDispatcher {
        &self.inner.mirror
    }

    #[must_use]
    pub fn settings(&self) -> &ServiceSettings {
        &self.inner.settings
    }

    /// Stored snapshot for `handle`, never touching the upstream.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidHandle`] or [`PipelineError::Persistence`].
    pub async fn get_cached(&self, handle: &str) -> Result<Option<ProfileView>, PipelineError> {
        let handle = normalize_handle(handle)?;
        let stored = self.inner.store.find_profile(&handle).await?;
        let now = Utc::now();
        Ok(stored.map(|p| {
            let freshness = self.inner.settings.freshness.decide(Some(&p), now);
            ProfileView::new(p, ViewSource::Cache, freshness)
        }))
    }

    /// Serves the stored snapshot while the gate forbids a refresh,
    /// otherwise acquires from upstream.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidHandle`] before any I/O.
    /// - [`PipelineError::NotFound`] / [`PipelineError::Forbidden`] from the
    ///   upstream.
    /// - [`PipelineError::Unavailable`] when acquisition failed and nothing
    ///   is stored.
    /// - [`PipelineError::Persistence`] when the store fails.
    pub async fn get_profile(&self, handle: &str) -> Result<ProfileView, PipelineError> {
        let handle = normalize_handle(handle)?;
        let stored = self.inner.store.find_profile(&handle).await?;
        let decision = self
            .inner
            .settings
            .freshness
            .decide(stored.as_ref(), Utc::now());

        match stored {
            Some(profile) if !decision.can_refresh => {
                tracing::debug!(
                    handle = %handle,
                    next_allowed_refresh = ?decision.next_allowed_refresh,
                    "serving cached profile"
                );
                Ok(ProfileView::new(profile, ViewSource::Cache, decision))
            }
            stored => self.acquire(handle, stored).await,
        }
    }

    /// Forces a refresh, subject to the gate.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Throttled`] with the next allowed instant when the
    /// gate forbids a refresh; otherwise as [`Self::get_profile`].
    pub async fn refresh_profile(&self, handle: &str) -> Result<ProfileView, PipelineError> {
        let handle = normalize_handle(handle)?;
        let stored = self.inner.store.find_profile(&handle).await?;
        let decision = self
            .inner
            .settings
            .freshness
            .decide(stored.as_ref(), Utc::now());
        if !decision.can_refresh {
            tracing::info!(
                handle = %handle,
                next_allowed_refresh = ?decision.next_allowed_refresh,
                "refresh throttled"
            );
            return Err(PipelineError::Throttled {
                handle,
                next_allowed_refresh: decision.next_allowed_refresh,
            });
        }
        self.acquire(handle, stored).await
    }

    /// One page of stored content, acquiring the profile first if needed.
    ///
    /// # Errors
    ///
    /// As [`Self::get_profile`].
    pub async fn get_content(
        &self,
        handle: &str,
        query: ContentQuery,
    ) -> Result<ContentPage, PipelineError> {
        let view = self.get_profile(handle).await?;
        Ok(self
            .inner
            .store
            .list_content(&view.profile.handle, query)
            .await?)
    }

    /// Analytics snapshot for `handle`, recomputed from stored content when
    /// the cached copy is missing.
    ///
    /// # Errors
    ///
    /// As [`Self::get_profile`].
    pub async fn get_analytics(&self, handle: &str) -> Result<AnalyticsView, PipelineError> {
        let view = self.get_profile(handle).await?;
        let analytics = match view.profile.analytics.clone() {
            Some(snapshot) => snapshot,
            None => {
                let items = self.inner.store.all_content(&view.profile.handle).await?;
                compute_analytics(&view.profile, &items)
            }
        };
        Ok(AnalyticsView {
            handle: view.profile.handle,
            analytics,
            stale: view.stale,
        })
    }

    /// Store-side hashtag aggregation, not limited to the snapshot's top ten.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidHandle`] or [`PipelineError::Persistence`].
    pub async fn top_hashtags(
        &self,
        handle: &str,
        limit: usize,
    ) -> Result<Vec<HashtagCount>, PipelineError> {
        let handle = normalize_handle(handle)?;
        Ok(self.inner.store.top_hashtags(&handle, limit).await?)
    }

    /// Stored profiles whose handle starts with `prefix`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Persistence`].
    pub async fn search(&self, prefix: &str, limit: usize) -> Result<Vec<Profile>, PipelineError> {
        Ok(self.inner.store.search_profiles(prefix, limit).await?)
    }

    /// Fetches up to `count` items not yet stored and merges them in. Not
    /// subject to the gate.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotFound`] when the profile is not stored, upstream
    /// errors when nothing could be fetched, or persistence errors.
    pub async fn backfill_content(
        &self,
        handle: &str,
        count: usize,
    ) -> Result<ProfileView, PipelineError> {
        let handle = normalize_handle(handle)?;
        let inner = &self.inner;
        let mut profile = inner
            .store
            .find_profile(&handle)
            .await?
            .ok_or_else(|| PipelineError::NotFound {
                handle: handle.clone(),
            })?;

        let have = inner.store.content_ids(&handle).await?;
        let items = inner
            .chain
            .fetch_content(&OwnerRef::from_profile(&profile), have, count)
            .await
            .map_err(|e| PipelineError::from_scraper(&handle, e))?;
        let summary = upsert_content(inner.store.as_ref(), &handle, &items).await?;
        tracing::info!(
            handle = %handle,
            saved = summary.saved,
            skipped = summary.skipped,
            "backfill stored"
        );

        inner.recompute_analytics(&mut profile).await?;
        let profile = inner.persist(profile).await?;
        if inner.settings.auto_mirror {
            inner.mirror.dispatch(&handle);
        }
        let freshness = inner.settings.freshness.decide(Some(&profile), Utc::now());
        Ok(ProfileView::new(profile, ViewSource::Upstream, freshness))
    }

    /// Mirrors `handle`'s assets inline and reports what happened.
    ///
    /// # Errors
    ///
    /// As [`crate::AssetMirror::run`].
    pub async fn mirror_assets(&self, handle: &str) -> Result<MirrorReport, PipelineError> {
        let handle = normalize_handle(handle)?;
        let mut shutdown = self.inner.mirror.shutdown_signal();
        self.inner.mirror.mirror().run(&handle, &mut shutdown).await
    }

    async fn acquire(
        &self,
        handle: String,
        stored: Option<Profile>,
    ) -> Result<ProfileView, PipelineError> {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.acquire(&handle, stored).await });
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(PipelineError::Persistence(DbError::Unavailable(format!(
                "acquisition task cancelled: {e}"
            )))),
        }
    }
}

impl Inner {
    async fn acquire(
        &self,
        handle: &str,
        stored: Option<Profile>,
    ) -> Result<ProfileView, PipelineError> {
        if let Some(profile) = &stored {
            let mut marked = profile.clone();
            marked.fetch_status = FetchStatus::InProgress;
            self.store.put_profile(&marked).await?;
        }

        let fetched = match self.chain.fetch_profile(handle).await {
            Ok(fetched) => fetched,
            Err(e) => return self.fail(handle, stored, e).await,
        };

        let mut profile = upsert_profile(self.store.as_ref(), &fetched.profile).await?;

        match self
            .chain
            .fetch_content(&fetched.owner(), Vec::new(), self.settings.content_target)
            .await
        {
            Ok(items) => {
                let summary = upsert_content(self.store.as_ref(), &profile.handle, &items).await?;
                tracing::info!(
                    handle = %profile.handle,
                    saved = summary.saved,
                    skipped = summary.skipped,
                    "content stored"
                );
            }
            Err(e) => {
                tracing::warn!(
                    handle = %profile.handle,
                    error = %e,
                    "content acquisition failed, keeping stored content"
                );
            }
        }

        let now = Utc::now();
        self.recompute_analytics(&mut profile).await?;
        profile.last_fetch_time = Some(now);
        profile.fetch_status = FetchStatus::Completed;
        profile.last_error = None;
        self.settings.freshness.record_fetch(&mut profile, now);
        let profile = self.persist(profile).await?;

        tracing::info!(
            handle = %profile.handle,
            strategy = fetched.strategy,
            followers = profile.follower_count,
            "profile acquired"
        );

        if self.settings.auto_mirror {
            self.mirror.dispatch(&profile.handle);
        }
        let freshness = self.settings.freshness.decide(Some(&profile), Utc::now());
        Ok(ProfileView::new(profile, ViewSource::Upstream, freshness))
    }

    /// Records a failed attempt on the stored profile, then returns either a
    /// stale fallback or the mapped error.
    async fn fail(
        &self,
        handle: &str,
        stored: Option<Profile>,
        error: ScraperError,
    ) -> Result<ProfileView, PipelineError> {
        let Some(mut profile) = stored else {
            tracing::warn!(handle, error = %error, "acquisition failed with nothing cached");
            return Err(PipelineError::from_scraper(handle, error));
        };

        let class = error.class();
        let now = Utc::now();
        self.record_failure(&mut profile, &error, now);
        if class == ErrorClass::NotFound {
            profile.is_active = false;
        }
        self.store.put_profile(&profile).await?;

        if class == ErrorClass::Transient {
            tracing::warn!(handle, error = %error, "refresh failed, serving stale snapshot");
            let freshness = self.settings.freshness.decide(Some(&profile), now);
            Ok(ProfileView::new(profile, ViewSource::StaleFallback, freshness))
        } else {
            tracing::warn!(handle, error = %error, ?class, "refresh failed");
            Err(PipelineError::from_scraper(handle, error))
        }
    }

    fn record_failure(&self, profile: &mut Profile, error: &ScraperError, now: DateTime<Utc>) {
        profile.fetch_status = FetchStatus::Failed;
        profile.last_error = Some(error.to_string());
        self.settings.freshness.record_fetch(profile, now);
    }

    /// Writes `profile` and returns the stored copy, which carries mirror
    /// fields set by a concurrent mirror run.
    async fn persist(&self, profile: Profile) -> Result<Profile, PipelineError> {
        self.store.put_profile(&profile).await?;
        Ok(self
            .store
            .find_profile(&profile.handle)
            .await?
            .unwrap_or(profile))
    }

    async fn recompute_analytics(&self, profile: &mut Profile) -> Result<(), PipelineError> {
        let items = self.store.all_content(&profile.handle).await?;
        profile.analytics = Some(compute_analytics(profile, &items));
        Ok(())
    }
}
