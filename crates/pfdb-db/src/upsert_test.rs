use super::*;
use crate::memory::MemoryStore;
use chrono::{TimeZone, Utc};
use pfdb_core::{ContentKind, FetchStatus};

fn fresh_profile(handle: &str, id: Option<&str>, followers: u64) -> Profile {
    let mut p = Profile::new(handle);
    p.external_id = id.map(str::to_string);
    p.follower_count = followers;
    p.avatar_source_url = Some(format!("https://cdn.example.com/{handle}.jpg"));
    p
}

fn content(owner: &str, id: &str) -> ContentItem {
    ContentItem {
        external_id: id.to_string(),
        shortcode: format!("SC{id}"),
        owner: owner.to_string(),
        kind: ContentKind::Image,
        caption: Some("sunset".to_string()),
        asset_source_url: Some(format!("https://cdn.example.com/{id}.jpg")),
        asset_mirrored_url: None,
        last_mirrored_source_url: None,
        like_count: 10,
        comment_count: 1,
        view_count: None,
        duration_secs: None,
        posted_at: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
        hashtags: vec![],
        mentions: vec![],
    }
}

#[tokio::test]
async fn first_upsert_creates_profile() {
    let store = MemoryStore::new();
    let saved = upsert_profile(&store, &fresh_profile("natgeo", Some("1"), 100))
        .await
        .unwrap();
    assert_eq!(saved.follower_count, 100);
    assert!(store.find_profile("natgeo").await.unwrap().is_some());
}

#[tokio::test]
async fn bookkeeping_and_mirror_fields_survive_refresh() {
    let store = MemoryStore::new();
    let mut stored = fresh_profile("natgeo", Some("1"), 100);
    stored.avatar_mirrored_url = Some("http://assets/natgeo/a.jpg".to_string());
    stored.avatar_last_mirrored_source_url = stored.avatar_source_url.clone();
    stored.daily_fetch_count = 3;
    stored.fetch_status = FetchStatus::Completed;
    store.put_profile(&stored).await.unwrap();

    let merged = upsert_profile(&store, &fresh_profile("natgeo", Some("1"), 250))
        .await
        .unwrap();
    assert_eq!(merged.follower_count, 250);
    assert_eq!(merged.daily_fetch_count, 3);
    assert_eq!(merged.fetch_status, FetchStatus::Completed);
    assert_eq!(
        merged.avatar_mirrored_url.as_deref(),
        Some("http://assets/natgeo/a.jpg")
    );
}

#[tokio::test]
async fn upsert_is_idempotent() {
    let store = MemoryStore::new();
    let fresh = fresh_profile("nasa", Some("2"), 9);
    let first = upsert_profile(&store, &fresh).await.unwrap();
    let second = upsert_profile(&store, &fresh).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn rename_is_followed_by_external_id() {
    let store = MemoryStore::new();
    store
        .put_profile(&fresh_profile("oldname", Some("7"), 1))
        .await
        .unwrap();
    store
        .put_content(Partition::Posts, &content("oldname", "a"))
        .await
        .unwrap();

    let merged = upsert_profile(&store, &fresh_profile("newname", Some("7"), 2))
        .await
        .unwrap();
    assert_eq!(merged.handle, "newname");
    assert!(store.find_profile("oldname").await.unwrap().is_none());
    assert_eq!(store.count_content("newname").await.unwrap(), 1);
}

#[tokio::test]
async fn handle_held_by_other_id_is_conflict() {
    let store = MemoryStore::new();
    store
        .put_profile(&fresh_profile("natgeo", Some("1"), 1))
        .await
        .unwrap();
    let err = upsert_profile(&store, &fresh_profile("natgeo", Some("2"), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Conflict(_)));
}

#[tokio::test]
async fn degraded_profile_keeps_known_external_id() {
    let store = MemoryStore::new();
    store
        .put_profile(&fresh_profile("natgeo", Some("1"), 1))
        .await
        .unwrap();
    let merged = upsert_profile(&store, &fresh_profile("natgeo", None, 5))
        .await
        .unwrap();
    assert_eq!(merged.external_id.as_deref(), Some("1"));
    assert_eq!(merged.follower_count, 5);
}

#[tokio::test]
async fn meta_tag_profile_does_not_reset_flags_or_bio() {
    let store = MemoryStore::new();
    let mut api = fresh_profile("natgeo", Some("1"), 100);
    api.is_verified = true;
    api.is_business = true;
    api.bio = Some("Experience the world".to_string());
    upsert_profile(&store, &api).await.unwrap();

    let mut meta = fresh_profile("natgeo", None, 283_000_000);
    meta.bio = Some("283M Followers, 150 Following, 30K Posts - See Instagram photos".to_string());
    upsert_profile(&store, &meta).await.unwrap();

    let stored = store.find_profile("natgeo").await.unwrap().unwrap();
    assert!(stored.is_verified);
    assert!(stored.is_business);
    assert_eq!(stored.bio.as_deref(), Some("Experience the world"));
    assert_eq!(stored.follower_count, 283_000_000);
}

#[tokio::test]
async fn put_never_overwrites_stored_mirror_fields() {
    let store = MemoryStore::new();
    let stale = fresh_profile("natgeo", Some("1"), 100);
    store.put_profile(&stale).await.unwrap();
    let item = content("natgeo", "a");
    store.put_content(Partition::Posts, &item).await.unwrap();

    // A mirror run lands between another writer's read and its write.
    store
        .update_avatar_mirror("natgeo", "http://assets/natgeo/av.jpg", "https://cdn.example.com/natgeo.jpg")
        .await
        .unwrap();
    store
        .update_content_mirror("natgeo", "a", "http://assets/natgeo/a.jpg", "https://cdn.example.com/a.jpg")
        .await
        .unwrap();
    store.put_profile(&stale).await.unwrap();
    store.put_content(Partition::Posts, &item).await.unwrap();

    let profile = store.find_profile("natgeo").await.unwrap().unwrap();
    assert_eq!(
        profile.avatar_mirrored_url.as_deref(),
        Some("http://assets/natgeo/av.jpg")
    );
    let stored = store.find_content("natgeo", "a").await.unwrap().unwrap().item;
    assert_eq!(
        stored.asset_mirrored_url.as_deref(),
        Some("http://assets/natgeo/a.jpg")
    );
    assert_eq!(
        stored.last_mirrored_source_url.as_deref(),
        Some("https://cdn.example.com/a.jpg")
    );
}

#[tokio::test]
async fn new_items_are_routed_and_existing_stay_put() {
    let store = MemoryStore::new();
    let post = content("o", "p1");
    let mut reel_like = content("o", "r1");
    reel_like.view_count = Some(100);
    reel_like.kind = ContentKind::Reel;

    let summary = upsert_content(&store, "o", &[post.clone(), reel_like])
        .await
        .unwrap();
    assert_eq!(summary, UpsertSummary { saved: 2, skipped: 0 });
    assert_eq!(store.partition_len(Partition::Posts).await, 1);
    assert_eq!(store.partition_len(Partition::Reels).await, 1);

    // A later sighting with a view count would sniff as reel-like, but the
    // item stays in the posts partition.
    let mut again = post;
    again.view_count = Some(5);
    again.like_count = 99;
    upsert_content(&store, "o", &[again]).await.unwrap();
    let stored = store.find_content("o", "p1").await.unwrap().unwrap();
    assert_eq!(stored.partition, Partition::Posts);
    assert_eq!(stored.item.like_count, 99);
}

#[tokio::test]
async fn kind_and_mirror_fields_are_preserved_on_update() {
    let store = MemoryStore::new();
    let mut stored = content("o", "a");
    stored.kind = ContentKind::Reel;
    stored.asset_mirrored_url = Some("http://assets/o/a.jpg".to_string());
    stored.last_mirrored_source_url = stored.asset_source_url.clone();
    store.put_content(Partition::Reels, &stored).await.unwrap();

    let mut fresh = content("o", "a");
    fresh.kind = ContentKind::Video;
    fresh.like_count = 42;
    upsert_content(&store, "o", &[fresh]).await.unwrap();

    let item = store.find_content("o", "a").await.unwrap().unwrap().item;
    assert_eq!(item.kind, ContentKind::Reel);
    assert_eq!(item.like_count, 42);
    assert_eq!(item.asset_mirrored_url.as_deref(), Some("http://assets/o/a.jpg"));
}

#[tokio::test]
async fn foreign_item_is_skipped_and_batch_continues() {
    let store = MemoryStore::new();
    let summary = upsert_content(&store, "o", &[content("someone_else", "x"), content("o", "y")])
        .await
        .unwrap();
    assert_eq!(summary, UpsertSummary { saved: 1, skipped: 1 });
}

#[tokio::test]
async fn unavailable_store_surfaces_as_error() {
    let store = MemoryStore::new();
    store.set_unavailable(true);
    let err = upsert_content(&store, "o", &[content("o", "a")])
        .await
        .unwrap_err();
    assert!(err.is_unavailable());
}
