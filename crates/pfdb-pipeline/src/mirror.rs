//! Copies upstream media into durable storage.
//!
//! An asset needs mirroring when it has a source URL and either no mirrored
//! URL or a mirrored URL produced from a different source. Objects are keyed
//! by the SHA-256 of the source URL under a folder named after the owner, so
//! an object that already exists is reused without downloading again.
//!
//! Writes back to the document store are field-scoped: only the mirrored URL
//! and its source are touched. A failed mirror leaves the previous mirrored
//! URL in place.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pfdb_core::AppConfig;
use pfdb_db::{DocumentStore, DurableAssetStore};
use pfdb_scraper::HttpFetch;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::PipelineError;

#[derive(Debug, Clone, Copy)]
pub struct MirrorSettings {
    /// Pause between consecutive downloads.
    pub inter_item_delay: Duration,
    /// Bound on a single download.
    pub timeout: Duration,
}

impl MirrorSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            inter_item_delay: Duration::from_millis(config.mirror_inter_item_delay_ms),
            timeout: Duration::from_secs(config.mirror_timeout_secs),
        }
    }
}

/// `true` when `source` should be (re)mirrored.
#[must_use]
pub fn needs_mirror(source: Option<&str>, mirrored: Option<&str>, last_source: Option<&str>) -> bool {
    match (source, mirrored) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(src), Some(_)) => last_source != Some(src),
    }
}

/// Object key for a source URL: hex SHA-256 plus the URL's file extension.
#[must_use]
pub fn object_key(source_url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(source_url.as_bytes()));
    let path = source_url.split(['?', '#']).next().unwrap_or(source_url);
    let file = path.rsplit('/').next().unwrap_or(path);
    let ext = file
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.bytes().all(|b| b.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    format!("{digest}.{ext}")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    pub handle: String,
    /// Downloaded and stored.
    pub mirrored: usize,
    /// Object already present in durable storage; only the record was updated.
    pub reused: usize,
    pub up_to_date: usize,
    pub failed: usize,
    /// Stopped early by the shutdown signal.
    pub cancelled: bool,
}

/// One thing that can be mirrored.
#[derive(Debug, Clone)]
enum Candidate {
    Avatar { source: String },
    Content { external_id: String, source: String },
}

impl Candidate {
    fn source(&self) -> &str {
        match self {
            Candidate::Avatar { source } | Candidate::Content { source, .. } => source,
        }
    }

    fn label(&self) -> &str {
        match self {
            Candidate::Avatar { .. } => "avatar",
            Candidate::Content { external_id, .. } => external_id,
        }
    }
}

enum Outcome {
    Downloaded,
    Reused,
}

pub struct AssetMirror {
    http: Arc<dyn HttpFetch>,
    assets: Arc<dyn DurableAssetStore>,
    store: Arc<dyn DocumentStore>,
    settings: MirrorSettings,
}

impl std::fmt::Debug for AssetMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetMirror")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AssetMirror {
    #[must_use]
    pub fn new(
        http: Arc<dyn HttpFetch>,
        assets: Arc<dyn DurableAssetStore>,
        store: Arc<dyn DocumentStore>,
        settings: MirrorSettings,
    ) -> Self {
        Self {
            http,
            assets,
            store,
            settings,
        }
    }

    /// Mirrors the avatar and every stored content item of `handle`, one at a
    /// time. Checks `shutdown` between items and during the inter-item delay.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NotFound`] when the profile is not stored.
    /// - [`PipelineError::Persistence`] when the candidate list cannot be read.
    ///
    /// Per-asset failures are counted in the report, never returned.
    pub async fn run(
        &self,
        handle: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<MirrorReport, PipelineError> {
        let profile = self
            .store
            .find_profile(handle)
            .await?
            .ok_or_else(|| PipelineError::NotFound {
                handle: handle.to_string(),
            })?;
        let items = self.store.all_content(handle).await?;

        let mut report = MirrorReport {
            handle: handle.to_string(),
            ..MirrorReport::default()
        };
        let mut pending = Vec::new();

        if needs_mirror(
            profile.avatar_source_url.as_deref(),
            profile.avatar_mirrored_url.as_deref(),
            profile.avatar_last_mirrored_source_url.as_deref(),
        ) {
            if let Some(source) = profile.avatar_source_url.clone() {
                pending.push(Candidate::Avatar { source });
            }
        } else if profile.avatar_source_url.is_some() {
            report.up_to_date += 1;
        }
        for item in items {
            let Some(source) = item.asset_source_url.clone() else {
                continue;
            };
            if needs_mirror(
                Some(&source),
                item.asset_mirrored_url.as_deref(),
                item.last_mirrored_source_url.as_deref(),
            ) {
                pending.push(Candidate::Content {
                    external_id: item.external_id,
                    source,
                });
            } else {
                report.up_to_date += 1;
            }
        }

        tracing::info!(handle, pending = pending.len(), up_to_date = report.up_to_date, "mirror run starting");

        let mut downloaded_any = false;
        for candidate in pending {
            if *shutdown.borrow() {
                report.cancelled = true;
                break;
            }
            let key = object_key(candidate.source());

            let exists = match self.assets.exists(handle, &key).await {
                Ok(exists) => exists,
                Err(e) => {
                    tracing::warn!(handle, asset = candidate.label(), error = %e, "asset store check failed");
                    report.failed += 1;
                    continue;
                }
            };
            if !exists && downloaded_any && !self.settings.inter_item_delay.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(self.settings.inter_item_delay) => {}
                    _ = shutdown.changed() => {
                        report.cancelled = true;
                        break;
                    }
                }
            }

            match self.mirror_one(handle, &candidate, &key, exists).await {
                Ok(Outcome::Downloaded) => {
                    downloaded_any = true;
                    report.mirrored += 1;
                }
                Ok(Outcome::Reused) => report.reused += 1,
                Err(reason) => {
                    if !exists {
                        downloaded_any = true;
                    }
                    tracing::warn!(
                        handle,
                        asset = candidate.label(),
                        source = candidate.source(),
                        error = %reason,
                        "mirror failed, keeping previous copy"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            handle,
            mirrored = report.mirrored,
            reused = report.reused,
            failed = report.failed,
            cancelled = report.cancelled,
            "mirror run finished"
        );
        Ok(report)
    }

    async fn mirror_one(
        &self,
        handle: &str,
        candidate: &Candidate,
        key: &str,
        exists: bool,
    ) -> Result<Outcome, String> {
        let source = candidate.source();
        let (url, outcome) = if exists {
            (self.assets.public_url(handle, key), Outcome::Reused)
        } else {
            let response = tokio::time::timeout(self.settings.timeout, self.http.get(source, &[]))
                .await
                .map_err(|_| format!("download timed out after {:?}", self.settings.timeout))?
                .map_err(|e| e.to_string())?;
            if !response.is_success() {
                return Err(format!("download returned HTTP {}", response.status));
            }
            if response.body.is_empty() {
                return Err("download returned an empty body".to_string());
            }
            let url = self
                .assets
                .put(handle, key, &response.body)
                .await
                .map_err(|e| e.to_string())?;
            (url, Outcome::Downloaded)
        };

        let updated = match candidate {
            Candidate::Avatar { .. } => self.store.update_avatar_mirror(handle, &url, source).await,
            Candidate::Content { external_id, .. } => {
                self.store
                    .update_content_mirror(handle, external_id, &url, source)
                    .await
            }
        }
        .map_err(|e| e.to_string())?;
        if !updated {
            return Err("record disappeared before the mirror could be recorded".to_string());
        }
        Ok(outcome)
    }
}

/// Runs [`AssetMirror`] jobs as detached tasks.
///
/// Jobs never block the caller. [`MirrorDispatcher::shutdown`] signals every
/// running job to stop at its next check and waits for them to exit.
#[derive(Debug)]
pub struct MirrorDispatcher {
    mirror: Arc<AssetMirror>,
    tasks: Mutex<JoinSet<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl MirrorDispatcher {
    #[must_use]
    pub fn new(mirror: AssetMirror) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            mirror: Arc::new(mirror),
            tasks: Mutex::new(JoinSet::new()),
            shutdown_tx,
        }
    }

    #[must_use]
    pub fn mirror(&self) -> &AssetMirror {
        &self.mirror
    }

    /// Receiver for callers that run the mirror inline.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Spawns a mirror run for `handle`. Failures are only logged.
    pub fn dispatch(&self, handle: &str) {
        if *self.shutdown_tx.borrow() {
            tracing::debug!(handle, "mirror dispatch ignored after shutdown");
            return;
        }
        let mirror = Arc::clone(&self.mirror);
        let mut shutdown = self.shutdown_tx.subscribe();
        let handle = handle.to_string();

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = mirror.run(&handle, &mut shutdown).await {
                tracing::warn!(handle = %handle, error = %e, "background mirror run failed");
            }
        });
    }

    /// Number of dispatched runs not yet reaped.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Waits for every dispatched run to finish on its own.
    pub async fn wait_idle(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "mirror task panicked or was aborted");
            }
        }
    }

    /// Signals running jobs to stop and waits for them.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        self.wait_idle().await;
    }
}
