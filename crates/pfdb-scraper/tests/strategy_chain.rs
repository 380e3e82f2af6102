//! Integration tests for `FetchStrategyChain` against a mock upstream.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use pfdb_core::ContentKind;
use pfdb_scraper::{
    ClientSettings, ErrorClass, FetchStrategyChain, OwnerRef, ReqwestFetcher, ScraperError,
    SlidingWindowLimiter, UpstreamClient,
};

const USER_ID: &str = "787132";

fn chain(base_url: &str) -> FetchStrategyChain {
    let http = ReqwestFetcher::new(5, "pfdb-test/0.1").expect("failed to build test fetcher");
    let client = UpstreamClient::new(
        Arc::new(http),
        Arc::new(SlidingWindowLimiter::new(Duration::from_secs(60), 1_000)),
        ClientSettings {
            base_url: base_url.to_owned(),
            app_id: "936619743392459".to_owned(),
            request_timeout: Duration::from_secs(5),
            max_retries: 0,
            backoff_base_ms: 0,
        },
    );
    FetchStrategyChain::new(client)
}

fn node(id: u64) -> serde_json::Value {
    json!({
        "node": {
            "id": id.to_string(),
            "shortcode": format!("SC{id}"),
            "__typename": "GraphImage",
            "display_url": format!("https://cdn.example.com/{id}.jpg"),
            "edge_media_to_caption": {"edges": [{"node": {"text": "#nature"}}]},
            "edge_liked_by": {"count": id * 10},
            "edge_media_to_comment": {"count": 1},
            "taken_at_timestamp": 1_700_000_000 + id
        }
    })
}

fn timeline(ids: impl IntoIterator<Item = u64>, cursor: Option<&str>) -> serde_json::Value {
    let edges: Vec<_> = ids.into_iter().map(node).collect();
    json!({
        "count": 500,
        "page_info": {"has_next_page": cursor.is_some(), "end_cursor": cursor},
        "edges": edges
    })
}

fn profile_body(ids: impl IntoIterator<Item = u64>, cursor: Option<&str>) -> serde_json::Value {
    json!({
        "data": {
            "user": {
                "id": USER_ID,
                "username": "newuser",
                "full_name": "New User",
                "is_verified": false,
                "edge_followed_by": {"count": 1200},
                "edge_follow": {"count": 80},
                "edge_owner_to_timeline_media": timeline(ids, cursor)
            }
        }
    })
}

/// Serves GraphQL timeline pages keyed by the `after` cursor in `variables`.
/// Page `n` (cursor `c{n}`) holds ids `n*12+1 ..= n*12+12`, with an optional
/// overlap of the previous page's last `overlap` ids.
struct TimelinePager {
    last_page: u64,
    overlap: u64,
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

        let start = (page * 12 + 1).saturating_sub(self.overlap);
        let ids = start..=page * 12 + 12;
        let next = (page < self.last_page).then(|| format!("c{}", page + 1));
        ResponseTemplate::new(200).set_body_json(json!({
            "data": {"user": {"edge_owner_to_timeline_media": timeline(ids, next.as_deref())}}
        }))
    }
}

async fn mount_profile(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// fetch_profile
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_profile_returns_profile_and_seed_page() {
    let server = MockServer::start().await;
    mount_profile(&server, profile_body(1..=12, Some("c1"))).await;

    let fetched = chain(&server.uri()).fetch_profile("@NewUser").await.unwrap();
    assert_eq!(fetched.strategy, "web_profile_info");
    assert_eq!(fetched.profile.handle, "newuser");
    assert_eq!(fetched.profile.external_id.as_deref(), Some(USER_ID));
    assert_eq!(fetched.profile.follower_count, 1200);
    assert_eq!(fetched.seed.len(), 12);
    assert_eq!(fetched.seed_cursor.as_deref(), Some("c1"));
}

#[tokio::test]
async fn fetch_profile_rejects_bad_handle_without_io() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = chain(&server.uri()).fetch_profile("no spaces!").await.unwrap_err();
    assert!(matches!(err, ScraperError::InvalidHandle(_)));
}

#[tokio::test]
async fn fetch_profile_not_found_short_circuits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ghost/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = chain(&server.uri()).fetch_profile("ghost").await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);
}

#[tokio::test]
async fn fetch_profile_falls_back_to_profile_page_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/natgeo/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "graphql": {"user": {"id": "1", "username": "natgeo", "edge_followed_by": {"count": 5}}}
        })))
        .mount(&server)
        .await;

    let fetched = chain(&server.uri()).fetch_profile("natgeo").await.unwrap();
    assert_eq!(fetched.strategy, "profile_page_json");
    assert_eq!(fetched.profile.follower_count, 5);
}

#[tokio::test]
async fn fetch_profile_degrades_to_meta_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let html = r#"<html><head>
        <meta property="og:title" content="National Geographic (@natgeo) • Instagram photos and videos">
        <meta property="og:description" content="1.2M Followers, 10 Following, 3,456 Posts - See Instagram photos">
        </head></html>"#;
    Mock::given(method("GET"))
        .and(path("/natgeo/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(&server)
        .await;

    let fetched = chain(&server.uri()).fetch_profile("natgeo").await.unwrap();
    assert_eq!(fetched.strategy, "html_page");
    assert!(fetched.profile.external_id.is_none());
    assert_eq!(fetched.profile.follower_count, 1_200_000);
    assert_eq!(fetched.profile.content_count, 3_456);
    assert!(fetched.seed.is_empty());
}

#[tokio::test]
async fn fetch_profile_returns_last_error_when_all_fail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = chain(&server.uri()).fetch_profile("natgeo").await.unwrap_err();
    assert!(matches!(err, ScraperError::UnexpectedStatus { status: 502, .. }));
}

// ---------------------------------------------------------------------------
// fetch_content
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_user_collects_target_from_later_strategies_without_duplicates() {
    let server = MockServer::start().await;
    mount_profile(&server, profile_body(1..=12, Some("c1"))).await;
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .respond_with(TimelinePager {
            last_page: 2,
            overlap: 4,
        })
        .mount(&server)
        .await;
    let mobile_items: Vec<_> = (30..=50)
        .map(|id| json!({"id": format!("{id}_{USER_ID}"), "code": format!("M{id}"), "media_type": 2, "video_duration": 12.5}))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/feed/user/{USER_ID}/")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": mobile_items,
            "more_available": false
        })))
        .mount(&server)
        .await;

    let chain = chain(&server.uri());
    let fetched = chain.fetch_profile("newuser").await.unwrap();
    let items = chain
        .fetch_content(&fetched.owner(), Vec::new(), 40)
        .await
        .unwrap();

    assert_eq!(items.len(), 40);
    let unique: HashSet<_> = items.iter().map(|i| i.external_id.clone()).collect();
    assert_eq!(unique.len(), 40, "duplicate external ids in result");
    // Primary page first, in source order.
    assert_eq!(items[0].external_id, "1");
    // Timeline pages cover 1..=36; the mobile feed contributes the rest.
    assert!(items.iter().any(|i| i.kind == ContentKind::Reel));
}

#[tokio::test]
async fn exhausted_strategies_return_what_was_gathered() {
    let server = MockServer::start().await;
    mount_profile(&server, profile_body(1..=12, None)).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let chain = chain(&server.uri());
    let fetched = chain.fetch_profile("newuser").await.unwrap();
    let items = chain
        .fetch_content(&fetched.owner(), Vec::new(), 40)
        .await
        .unwrap();
    assert_eq!(items.len(), 12);
}

#[tokio::test]
async fn already_have_ids_are_not_returned() {
    let server = MockServer::start().await;
    mount_profile(&server, profile_body(1..=12, None)).await;

    let chain = chain(&server.uri());
    let fetched = chain.fetch_profile("newuser").await.unwrap();
    let have: Vec<String> = (1..=6).map(|i: u64| i.to_string()).collect();
    let items = chain.fetch_content(&fetched.owner(), have, 40).await.unwrap();
    let ids: Vec<_> = items.iter().map(|i| i.external_id.as_str()).collect();
    assert_eq!(ids, vec!["7", "8", "9", "10", "11", "12"]);
}

#[tokio::test]
async fn pages_of_known_items_do_not_stop_pagination() {
    let server = MockServer::start().await;
    mount_profile(&server, profile_body(1..=12, None)).await;
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .respond_with(TimelinePager {
            last_page: 3,
            overlap: 0,
        })
        .expect(2)
        .mount(&server)
        .await;

    let owner = OwnerRef {
        handle: "newuser".to_owned(),
        user_id: Some(USER_ID.to_owned()),
        ..OwnerRef::default()
    };
    let have: Vec<String> = (1..=12).map(|i: u64| i.to_string()).collect();
    let chain = chain(&server.uri());
    let items = chain.fetch_content(&owner, have, 12).await.unwrap();

    let ids: Vec<u64> = items
        .iter()
        .map(|i| i.external_id.parse().unwrap())
        .collect();
    assert_eq!(ids, (13..=24).collect::<Vec<_>>());
}

/// Always answers with the same page and the same cursor.
struct StuckPager;

impl Respond for StuckPager {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "data": {"user": {"edge_owner_to_timeline_media": timeline(1..=12, Some("c1"))}}
        }))
    }
}

#[tokio::test]
async fn repeated_cursor_ends_the_strategy() {
    let server = MockServer::start().await;
    mount_profile(&server, profile_body(Vec::<u64>::new(), None)).await;
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .respond_with(StuckPager)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/feed/user/{USER_ID}/")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [],
            "more_available": false
        })))
        .mount(&server)
        .await;

    let owner = OwnerRef {
        handle: "newuser".to_owned(),
        user_id: Some(USER_ID.to_owned()),
        ..OwnerRef::default()
    };
    let chain = chain(&server.uri());
    let items = chain.fetch_content(&owner, Vec::new(), 40).await.unwrap();
    assert_eq!(items.len(), 12);
}

#[tokio::test]
async fn timeline_pagination_respects_page_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .respond_with(TimelinePager {
            last_page: 1_000,
            overlap: 0,
        })
        .expect(10)
        .mount(&server)
        .await;
    // Primary strategy (no seed) sees an empty timeline.
    mount_profile(&server, profile_body(Vec::<u64>::new(), None)).await;

    let owner = OwnerRef {
        handle: "newuser".to_owned(),
        user_id: Some(USER_ID.to_owned()),
        ..OwnerRef::default()
    };
    let chain = chain(&server.uri());
    let items = chain.fetch_content(&owner, Vec::new(), 1_000).await.unwrap();
    assert_eq!(items.len(), 120);
}

#[tokio::test]
async fn every_strategy_failing_returns_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let owner = OwnerRef {
        handle: "newuser".to_owned(),
        user_id: Some(USER_ID.to_owned()),
        ..OwnerRef::default()
    };
    let err = chain(&server.uri())
        .fetch_content(&owner, Vec::new(), 40)
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transient);
}

#[tokio::test]
async fn primary_not_found_short_circuits_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let owner = OwnerRef {
        handle: "gone".to_owned(),
        user_id: Some(USER_ID.to_owned()),
        ..OwnerRef::default()
    };
    let err = chain(&server.uri())
        .fetch_content(&owner, Vec::new(), 40)
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::NotFound);
}
