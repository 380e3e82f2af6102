//! Conversion from raw upstream shapes into canonical records.
//!
//! Both entry points are pure and deterministic: the same raw payload always
//! yields the same record. Kind classification happens here, once; later
//! upserts never re-derive it.

use chrono::{DateTime, Utc};
use pfdb_core::{ContentItem, ContentKind, Profile};

use crate::error::ScraperError;
use crate::meta::display_name_from_title;
use crate::parse::{extract_hashtags, extract_mentions};
use crate::types::{GraphMediaNode, GraphUser, MetaProfile, MobileMediaItem, RawContent, RawProfile};

/// Videos shorter than this are classified as reels when nothing more
/// explicit says otherwise.
pub const REEL_MAX_DURATION_SECS: f64 = 90.0;

const MEDIA_TYPE_IMAGE: u8 = 1;
const MEDIA_TYPE_VIDEO: u8 = 2;
const MEDIA_TYPE_CAROUSEL: u8 = 8;

/// Converts a raw profile payload into a canonical [`Profile`].
///
/// `requested_handle` fills in the handle when the payload omits it. Fetch
/// bookkeeping and mirror fields are left at their defaults; the persistence
/// merge owns those.
///
/// # Errors
///
/// Returns [`ScraperError::Validation`] when a graph-shaped payload has
/// neither an ID nor a username.
pub fn normalize_profile(raw: &RawProfile, requested_handle: &str) -> Result<Profile, ScraperError> {
    match raw {
        RawProfile::Graph(user) => normalize_graph_user(user, requested_handle),
        RawProfile::Meta(meta) => Ok(normalize_meta_profile(meta)),
    }
}

/// Converts a raw content payload into a canonical [`ContentItem`] owned by
/// `owner`.
///
/// # Errors
///
/// Returns [`ScraperError::Validation`] when the external ID or shortcode is
/// missing.
pub fn normalize_content(raw: &RawContent, owner: &str) -> Result<ContentItem, ScraperError> {
    match raw {
        RawContent::Graph(node) => normalize_graph_node(node, owner),
        RawContent::Mobile(item) => normalize_mobile_item(item, owner),
    }
}

fn normalize_graph_user(user: &GraphUser, requested_handle: &str) -> Result<Profile, ScraperError> {
    if user.id.is_none() && user.username.is_none() {
        return Err(ScraperError::validation(format!(
            "profile payload for {requested_handle} has neither id nor username"
        )));
    }

    let handle = user
        .username
        .as_deref()
        .map_or_else(|| requested_handle.to_string(), str::to_lowercase);

    let mut profile = Profile::new(handle);
    profile.external_id.clone_from(&user.id);
    profile.display_name = non_empty(user.full_name.as_deref());
    profile.bio = non_empty(user.biography.as_deref());
    profile.external_url = non_empty(user.external_url.as_deref());
    profile.avatar_source_url = non_empty(
        user.profile_pic_url_hd
            .as_deref()
            .or(user.profile_pic_url.as_deref()),
    );
    profile.follower_count = edge_count(user.edge_followed_by.as_ref());
    profile.following_count = edge_count(user.edge_follow.as_ref());
    profile.content_count = user
        .edge_owner_to_timeline_media
        .as_ref()
        .and_then(|m| m.count)
        .unwrap_or(0);
    profile.is_verified = user.is_verified;
    profile.is_business = user.is_business_account;
    profile.is_private = user.is_private;
    Ok(profile)
}

fn normalize_meta_profile(meta: &MetaProfile) -> Profile {
    let mut profile = Profile::new(meta.handle.clone());
    profile.display_name = meta.title.as_deref().and_then(display_name_from_title);
    profile.bio = non_empty(meta.description.as_deref());
    profile.avatar_source_url = non_empty(meta.image.as_deref());
    profile.follower_count = meta.followers;
    profile.following_count = meta.following;
    profile.content_count = meta.posts;
    profile
}

fn normalize_graph_node(node: &GraphMediaNode, owner: &str) -> Result<ContentItem, ScraperError> {
    let external_id = require(node.id.as_deref(), "media node without id")?;
    let shortcode = require(node.shortcode.as_deref(), "media node without shortcode")?;
    let kind = classify_graph(node);
    let caption = non_empty(node.caption_text());

    let like_count = node
        .edge_liked_by
        .as_ref()
        .and_then(|e| e.count)
        .or_else(|| node.edge_media_preview_like.as_ref().and_then(|e| e.count))
        .unwrap_or(0);

    let (view_count, duration_secs) = if kind.is_video_like() {
        (
            Some(
                node.video_view_count
                    .or(node.video_play_count)
                    .unwrap_or(0),
            ),
            node.video_duration,
        )
    } else {
        (None, None)
    };

    Ok(ContentItem {
        external_id,
        shortcode,
        owner: owner.to_string(),
        kind,
        hashtags: extract_hashtags(caption.as_deref()),
        mentions: extract_mentions(caption.as_deref()),
        caption,
        asset_source_url: non_empty(node.display_url.as_deref().or(node.thumbnail_src.as_deref())),
        asset_mirrored_url: None,
        last_mirrored_source_url: None,
        like_count,
        comment_count: edge_count(node.edge_media_to_comment.as_ref()),
        view_count,
        duration_secs,
        posted_at: node.taken_at_timestamp.and_then(unix_to_utc),
    })
}

fn normalize_mobile_item(item: &MobileMediaItem, owner: &str) -> Result<ContentItem, ScraperError> {
    let external_id = require(item.media_id().as_deref(), "feed item without id")?;
    let shortcode = require(item.code.as_deref(), "feed item without code")?;
    let kind = classify_mobile(item);
    let caption = non_empty(item.caption.as_ref().and_then(|c| c.text.as_deref()));

    let (view_count, duration_secs) = if kind.is_video_like() {
        (
            Some(item.play_count.or(item.view_count).unwrap_or(0)),
            item.video_duration,
        )
    } else {
        (None, None)
    };

    let asset_source_url = item
        .image_versions2
        .as_ref()
        .and_then(|v| v.candidates.first())
        .and_then(|c| non_empty(c.url.as_deref()));

    Ok(ContentItem {
        external_id,
        shortcode,
        owner: owner.to_string(),
        kind,
        hashtags: extract_hashtags(caption.as_deref()),
        mentions: extract_mentions(caption.as_deref()),
        caption,
        asset_source_url,
        asset_mirrored_url: None,
        last_mirrored_source_url: None,
        like_count: item.like_count.unwrap_or(0),
        comment_count: item.comment_count.unwrap_or(0),
        view_count,
        duration_secs,
        posted_at: item.taken_at.and_then(unix_to_utc),
    })
}

/// Kind priority: explicit discriminator, clip metadata, short duration,
/// generic video flag, image.
fn classify_graph(node: &GraphMediaNode) -> ContentKind {
    match node.product_type.as_deref() {
        Some("clips") => return ContentKind::Reel,
        Some("carousel_container") => return ContentKind::Carousel,
        _ => {}
    }
    match node.typename.as_deref() {
        Some("GraphSidecar" | "XDTGraphSidecar") => return ContentKind::Carousel,
        Some("GraphImage" | "XDTGraphImage") => return ContentKind::Image,
        _ => {}
    }
    if node.clips_metadata.as_ref().is_some_and(|v| !v.is_null()) {
        return ContentKind::Reel;
    }
    video_kind(node.is_video, node.video_duration)
}

fn classify_mobile(item: &MobileMediaItem) -> ContentKind {
    match item.product_type.as_deref() {
        Some("clips") => return ContentKind::Reel,
        Some("carousel_container") => return ContentKind::Carousel,
        _ => {}
    }
    match item.media_type {
        Some(MEDIA_TYPE_CAROUSEL) => return ContentKind::Carousel,
        Some(MEDIA_TYPE_IMAGE) => return ContentKind::Image,
        _ => {}
    }
    if item.clips_metadata.as_ref().is_some_and(|v| !v.is_null()) {
        return ContentKind::Reel;
    }
    video_kind(item.media_type == Some(MEDIA_TYPE_VIDEO), item.video_duration)
}

fn video_kind(is_video: bool, duration: Option<f64>) -> ContentKind {
    if !is_video {
        return ContentKind::Image;
    }
    match duration {
        Some(secs) if secs > 0.0 && secs < REEL_MAX_DURATION_SECS => ContentKind::Reel,
        _ => ContentKind::Video,
    }
}

fn require(value: Option<&str>, reason: &str) -> Result<String, ScraperError> {
    non_empty(value).ok_or_else(|| ScraperError::validation(reason))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn edge_count(edge: Option<&crate::types::EdgeCount>) -> u64 {
    edge.and_then(|e| e.count).unwrap_or(0)
}

fn unix_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
