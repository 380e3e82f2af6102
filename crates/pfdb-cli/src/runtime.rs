//! Wires configuration into a [`ProfileService`].

use std::sync::Arc;
use std::time::Duration;

use pfdb_core::AppConfig;
use pfdb_db::{DocumentStore, FsAssetStore, MemoryStore, PgDocumentStore};
use pfdb_pipeline::{AssetMirror, MirrorDispatcher, MirrorSettings, ProfileService, ServiceSettings};
use pfdb_scraper::{
    ClientSettings, FetchStrategyChain, HttpFetch, ReqwestFetcher, SlidingWindowLimiter,
    UpstreamClient,
};

/// Postgres when `DATABASE_URL` is set, otherwise an in-memory store that
/// lives as long as the process.
async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    if config.database_url.is_some() {
        let pool = pfdb_db::connect_pool_from_config(config).await?;
        Ok(Arc::new(PgDocumentStore::new(pool)))
    } else {
        tracing::warn!("DATABASE_URL is not set; using the in-memory store, nothing persists");
        Ok(Arc::new(MemoryStore::new()))
    }
}

/// Builds the service for one CLI invocation. The upstream client and the
/// mirror share one HTTP connection pool; the rate limiter covers upstream
/// calls only.
///
/// # Errors
///
/// Returns an error if the database is unreachable or the HTTP client
/// cannot be built.
pub(crate) async fn build_service(config: &AppConfig) -> anyhow::Result<ProfileService> {
    let store = build_store(config).await?;

    let http: Arc<dyn HttpFetch> = Arc::new(ReqwestFetcher::new(
        config.scraper_request_timeout_secs,
        &config.scraper_user_agent,
    )?);
    let limiter = Arc::new(SlidingWindowLimiter::new(
        Duration::from_secs(config.rate_limit_window_secs),
        config.rate_limit_max_calls,
    ));
    let client = UpstreamClient::new(Arc::clone(&http), limiter, ClientSettings::from_config(config));

    let assets = Arc::new(FsAssetStore::new(
        config.asset_root.clone(),
        &config.asset_public_base_url,
    ));
    let mirror = AssetMirror::new(
        http,
        assets,
        Arc::clone(&store),
        MirrorSettings::from_config(config),
    );

    Ok(ProfileService::new(
        FetchStrategyChain::new(client),
        store,
        Arc::new(MirrorDispatcher::new(mirror)),
        ServiceSettings::from_config(config),
    ))
}
