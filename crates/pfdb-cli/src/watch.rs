//! Scheduled refresh of the watchlist.
//!
//! Each pass runs `get_profile` for every watched handle, so the staleness
//! gate decides per handle whether the upstream is contacted at all.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use pfdb_core::AppConfig;
use pfdb_pipeline::{PipelineError, ProfileService, ProfileView, ViewSource};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};

#[derive(Debug, Default, Serialize)]
pub(crate) struct PassSummary {
    pub(crate) cached: usize,
    pub(crate) acquired: usize,
    pub(crate) stale: usize,
    pub(crate) failed: Vec<FailedHandle>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FailedHandle {
    pub(crate) handle: String,
    pub(crate) error: String,
}

impl PassSummary {
    fn record(&mut self, handle: String, outcome: Result<ProfileView, PipelineError>) {
        match outcome {
            Ok(view) => match view.source {
                ViewSource::Cache => self.cached += 1,
                ViewSource::Upstream => self.acquired += 1,
                ViewSource::StaleFallback => self.stale += 1,
            },
            Err(e) => {
                tracing::warn!(handle = %handle, error = %e, "watch: handle failed");
                self.failed.push(FailedHandle {
                    handle,
                    error: e.to_string(),
                });
            }
        }
    }
}

/// One pass over the watchlist, at most `max_concurrent_handles` at a time.
///
/// # Errors
///
/// Returns an error only if the watchlist cannot be loaded; per-handle
/// failures are collected in the summary.
pub(crate) async fn run_pass(
    service: &ProfileService,
    config: &AppConfig,
) -> anyhow::Result<PassSummary> {
    let watchlist = pfdb_core::load_watchlist(&config.watchlist_path)?;
    let handles = watchlist.handles();
    tracing::info!(count = handles.len(), "watch: pass starting");

    let max_concurrent = config.max_concurrent_handles.max(1);
    let outcomes: Vec<_> = stream::iter(handles)
        .map(|handle| async move {
            let outcome = service.get_profile(&handle).await;
            (handle, outcome)
        })
        .buffer_unordered(max_concurrent)
        .collect()
        .await;

    let mut summary = PassSummary::default();
    for (handle, outcome) in outcomes {
        summary.record(handle, outcome);
    }
    tracing::info!(
        cached = summary.cached,
        acquired = summary.acquired,
        stale = summary.stale,
        failed = summary.failed.len(),
        "watch: pass complete"
    );
    Ok(summary)
}

/// Runs one pass and prints it when `once`; otherwise schedules passes on
/// `PFDB_WATCH_SCHEDULE` until interrupted.
pub(crate) async fn run_watch(
    service: &ProfileService,
    config: &AppConfig,
    once: bool,
) -> anyhow::Result<()> {
    if once {
        let summary = run_pass(service, config).await?;
        return crate::print_json(&summary);
    }

    let mut scheduler = JobScheduler::new().await?;
    let job_service = service.clone();
    let job_config = Arc::new(config.clone());
    let job = Job::new_async(config.watch_schedule.as_str(), move |_uuid, _lock| {
        let service = job_service.clone();
        let config = Arc::clone(&job_config);
        Box::pin(async move {
            if let Err(e) = run_pass(&service, &config).await {
                tracing::error!(error = %e, "watch: pass aborted");
            }
        })
    })?;
    scheduler.add(job).await?;
    scheduler.start().await?;
    tracing::info!(schedule = %config.watch_schedule, "watch: scheduler started");

    shutdown_signal().await?;
    scheduler.shutdown().await?;
    service.mirror().shutdown().await;
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    tracing::info!("watch: received shutdown signal");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pfdb_core::{FreshnessPolicy, Profile};

    fn view(source: ViewSource) -> ProfileView {
        let profile = Profile::new("natgeo");
        let freshness = FreshnessPolicy::default().decide(Some(&profile), chrono::Utc::now());
        ProfileView {
            stale: source == ViewSource::StaleFallback,
            profile,
            source,
            freshness,
        }
    }

    #[test]
    fn summary_counts_each_outcome() {
        let mut summary = PassSummary::default();
        summary.record("a".into(), Ok(view(ViewSource::Cache)));
        summary.record("b".into(), Ok(view(ViewSource::Upstream)));
        summary.record("c".into(), Ok(view(ViewSource::StaleFallback)));
        summary.record(
            "d".into(),
            Err(PipelineError::NotFound {
                handle: "d".into(),
            }),
        );

        assert_eq!(summary.cached, 1);
        assert_eq!(summary.acquired, 1);
        assert_eq!(summary.stale, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].handle, "d");
        assert_eq!(summary.failed[0].error, "@d does not exist upstream");
    }
}
