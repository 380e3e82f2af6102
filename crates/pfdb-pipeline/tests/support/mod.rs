//! Shared fixtures: a mock upstream plus in-memory stores wired into a
//! `ProfileService`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use pfdb_core::{ContentItem, ContentKind, FetchStatus, FreshnessPolicy, Profile};
use pfdb_db::{MemoryAssetStore, MemoryStore};
use pfdb_pipeline::{AssetMirror, MirrorDispatcher, MirrorSettings, ProfileService, ServiceSettings};
use pfdb_scraper::{
    ClientSettings, FetchStrategyChain, HttpFetch, ReqwestFetcher, SlidingWindowLimiter,
    UpstreamClient,
};

pub const USER_ID: &str = "787132";

pub struct Harness {
    pub service: ProfileService,
    pub store: Arc<MemoryStore>,
    pub assets: Arc<MemoryAssetStore>,
}

pub fn settings(content_target: usize, auto_mirror: bool) -> ServiceSettings {
    ServiceSettings {
        content_target,
        freshness: FreshnessPolicy::default(),
        auto_mirror,
    }
}

pub fn mirror_settings() -> MirrorSettings {
    MirrorSettings {
        inter_item_delay: Duration::ZERO,
        timeout: Duration::from_secs(5),
    }
}

pub fn fetcher() -> Arc<dyn HttpFetch> {
    Arc::new(ReqwestFetcher::new(5, "pfdb-test/0.1").expect("failed to build test fetcher"))
}

pub fn harness(base_url: &str, settings: ServiceSettings) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let assets = Arc::new(MemoryAssetStore::new());
    let http = fetcher();
    let client = UpstreamClient::new(
        Arc::clone(&http),
        Arc::new(SlidingWindowLimiter::new(Duration::from_secs(60), 1_000)),
        ClientSettings {
            base_url: base_url.to_owned(),
            app_id: "936619743392459".to_owned(),
            request_timeout: Duration::from_secs(5),
            max_retries: 0,
            backoff_base_ms: 0,
        },
    );
    let mirror = AssetMirror::new(http, assets.clone(), store.clone(), mirror_settings());
    let service = ProfileService::new(
        FetchStrategyChain::new(client),
        store.clone(),
        Arc::new(MirrorDispatcher::new(mirror)),
        settings,
    );
    Harness {
        service,
        store,
        assets,
    }
}

pub fn node(base_url: &str, id: u64) -> serde_json::Value {
    json!({
        "node": {
            "id": id.to_string(),
            "shortcode": format!("SC{id}"),
            "__typename": "GraphImage",
            "display_url": format!("{base_url}/cdn/{id}.jpg"),
            "edge_media_to_caption": {"edges": [{"node": {"text": "out west #travel #nature"}}]},
            "edge_liked_by": {"count": id * 10},
            "edge_media_to_comment": {"count": 2},
            "taken_at_timestamp": 1_700_000_000 + id
        }
    })
}

pub fn timeline(base_url: &str, ids: impl IntoIterator<Item = u64>, cursor: Option<&str>) -> serde_json::Value {
    let edges: Vec<_> = ids.into_iter().map(|id| node(base_url, id)).collect();
    json!({
        "count": 500,
        "page_info": {"has_next_page": cursor.is_some(), "end_cursor": cursor},
        "edges": edges
    })
}

pub fn profile_body(base_url: &str, handle: &str, cursor: Option<&str>) -> serde_json::Value {
    json!({
        "data": {
            "user": {
                "id": USER_ID,
                "username": handle,
                "full_name": "New User",
                "profile_pic_url_hd": format!("{base_url}/cdn/avatar.jpg"),
                "edge_followed_by": {"count": 1200},
                "edge_follow": {"count": 80},
                "edge_owner_to_timeline_media": timeline(base_url, 1..=12, cursor)
            }
        }
    })
}

/// GraphQL timeline pages keyed by the `after` cursor: page `n` holds ids
/// `n*12+1 ..= n*12+12` and links to `c{n+1}` until `last_page`.
pub struct TimelinePager {
    pub base_url: String,
    pub last_page: u64,
}

impl Respond for TimelinePager {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let variables = request
            .url
            .query_pairs()
            .find(|(k, _)| k == "variables")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let vars: serde_json::Value = serde_json::from_str(&variables).unwrap_or_default();
        let page: u64 = vars["after"]
            .as_str()
            .and_then(|c| c.strip_prefix('c'))
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);

        let ids = page * 12 + 1..=page * 12 + 12;
        let next = (page < self.last_page).then(|| format!("c{}", page + 1));
        ResponseTemplate::new(200).set_body_json(json!({
            "data": {"user": {"edge_owner_to_timeline_media": timeline(&self.base_url, ids, next.as_deref())}}
        }))
    }
}

/// Profile, timeline and media endpoints for a healthy account.
pub async fn mount_account(server: &MockServer, handle: &str, last_page: u64) {
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(profile_body(&base, handle, Some("c1"))))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .respond_with(TimelinePager {
            base_url: base,
            last_page,
        })
        .mount(server)
        .await;
    mount_cdn(server).await;
}

pub async fn mount_cdn(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/cdn/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\xff\xd8\xff\xe0jpeg".to_vec()))
        .mount(server)
        .await;
}

/// A stored profile last fetched at `fetched_at`, with `attempts` counted
/// against today's quota.
pub fn stored_profile(handle: &str, fetched_at: DateTime<Utc>, attempts: u32) -> Profile {
    let policy = FreshnessPolicy::default();
    let mut p = Profile::new(handle);
    p.external_id = Some(USER_ID.to_string());
    p.follower_count = 999;
    p.last_fetch_time = Some(fetched_at);
    p.fetch_status = FetchStatus::Completed;
    p.daily_fetch_count = attempts;
    p.daily_quota_reset_time = Some(policy.next_reset(Utc::now()));
    p
}

pub fn item(owner: &str, id: &str, source: Option<String>) -> ContentItem {
    ContentItem {
        external_id: id.to_string(),
        shortcode: format!("SC{id}"),
        owner: owner.to_string(),
        kind: ContentKind::Image,
        caption: None,
        asset_source_url: source,
        asset_mirrored_url: None,
        last_mirrored_source_url: None,
        like_count: 1,
        comment_count: 0,
        view_count: None,
        duration_secs: None,
        posted_at: None,
        hashtags: vec![],
        mentions: vec![],
    }
}
