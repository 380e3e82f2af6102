//! Raw upstream response shapes.
//!
//! ## Observed shapes
//!
//! The upstream answers the same question through several endpoints that
//! disagree on field names and nesting:
//!
//! ### Graph shape
//! `web_profile_info`, the profile page JSON (`?__a=1`), the embedded
//! `window._sharedData` blob and the timeline GraphQL query all return a
//! "graph user" whose counts live under `edge_*` wrappers
//! (`edge_followed_by.count`) and whose media are `edges[].node` objects with a
//! `__typename` of `GraphImage`, `GraphVideo` or `GraphSidecar`.
//!
//! ### Mobile shape
//! The mobile feed and clips endpoints return flat `items[]` with
//! `media_type` codes (1 image, 2 video, 8 carousel), `code` instead of
//! `shortcode`, and `taken_at` instead of `taken_at_timestamp`. IDs may be
//! composite (`"3141592653_787132"`); `pk` carries the bare media ID.
//!
//! ### IDs
//! IDs arrive as JSON strings on some endpoints and as numbers on others.
//! [`de_opt_id`] accepts both and always yields a string, so large IDs never
//! pass through `f64`.
//!
//! Every field that has ever been observed missing is `#[serde(default)]`.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Str(String),
    Num(u64),
}

/// Accepts `"123"`, `123` or `null`.
pub(crate) fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<IdRepr>::deserialize(deserializer)?;
    Ok(repr.and_then(|r| match r {
        IdRepr::Str(s) if s.trim().is_empty() => None,
        IdRepr::Str(s) => Some(s),
        IdRepr::Num(n) => Some(n.to_string()),
    }))
}

// ---------------------------------------------------------------------------
// Tagged unions consumed by the normalizer
// ---------------------------------------------------------------------------

/// Any profile payload the strategies can produce.
#[derive(Debug, Clone)]
pub enum RawProfile {
    Graph(GraphUser),
    Meta(MetaProfile),
}

/// Any content payload the strategies can produce.
#[derive(Debug, Clone)]
pub enum RawContent {
    Graph(GraphMediaNode),
    Mobile(MobileMediaItem),
}

impl RawContent {
    /// Upstream media ID, if the payload carries one.
    #[must_use]
    pub fn external_id(&self) -> Option<String> {
        match self {
            RawContent::Graph(node) => node.id.clone(),
            RawContent::Mobile(item) => item.media_id(),
        }
    }
}

// ---------------------------------------------------------------------------
// Graph shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EdgeCount {
    #[serde(default)]
    pub count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Edge<T> {
    pub node: T,
}

/// `edge_owner_to_timeline_media`: total count plus one page of nodes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineMedia {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub page_info: Option<PageInfo>,
    #[serde(default)]
    pub edges: Vec<Edge<GraphMediaNode>>,
}

impl TimelineMedia {
    /// Cursor for the next page, only when the upstream says there is one.
    #[must_use]
    pub fn next_cursor(&self) -> Option<String> {
        self.page_info
            .as_ref()
            .filter(|p| p.has_next_page)
            .and_then(|p| p.end_cursor.clone())
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphUser {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub biography: Option<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
    /// Higher-resolution avatar; preferred when present.
    #[serde(default)]
    pub profile_pic_url_hd: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_business_account: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub edge_followed_by: Option<EdgeCount>,
    #[serde(default)]
    pub edge_follow: Option<EdgeCount>,
    #[serde(default)]
    pub edge_owner_to_timeline_media: Option<TimelineMedia>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptionNode {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptionEdges {
    #[serde(default)]
    pub edges: Vec<Edge<CaptionNode>>,
}

/// One media node from a graph-shaped timeline.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphMediaNode {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub shortcode: Option<String>,
    /// `GraphImage`, `GraphVideo` or `GraphSidecar`.
    #[serde(default, rename = "__typename")]
    pub typename: Option<String>,
    /// `"clips"` for reels, `"feed"` or `"carousel_container"` otherwise.
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub video_duration: Option<f64>,
    #[serde(default)]
    pub video_view_count: Option<u64>,
    #[serde(default)]
    pub video_play_count: Option<u64>,
    #[serde(default)]
    pub clips_metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub display_url: Option<String>,
    #[serde(default)]
    pub thumbnail_src: Option<String>,
    #[serde(default)]
    pub edge_media_to_caption: Option<CaptionEdges>,
    /// Newer payloads use `edge_liked_by`, older ones `edge_media_preview_like`.
    #[serde(default)]
    pub edge_liked_by: Option<EdgeCount>,
    #[serde(default)]
    pub edge_media_preview_like: Option<EdgeCount>,
    #[serde(default)]
    pub edge_media_to_comment: Option<EdgeCount>,
    #[serde(default)]
    pub taken_at_timestamp: Option<i64>,
}

impl GraphMediaNode {
    #[must_use]
    pub fn caption_text(&self) -> Option<&str> {
        self.edge_media_to_caption
            .as_ref()?
            .edges
            .first()?
            .node
            .text
            .as_deref()
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserEnvelope {
    #[serde(default)]
    pub user: Option<GraphUser>,
}

/// `GET /api/v1/users/web_profile_info/?username=`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebProfileInfoResponse {
    #[serde(default)]
    pub data: Option<UserEnvelope>,
}

/// `GET /{handle}/?__a=1...`, and each `ProfilePage` entry in `_sharedData`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePageResponse {
    #[serde(default)]
    pub graphql: Option<UserEnvelope>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineUser {
    #[serde(default)]
    pub edge_owner_to_timeline_media: Option<TimelineMedia>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineData {
    #[serde(default)]
    pub user: Option<TimelineUser>,
}

/// Timeline GraphQL query response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelinePageResponse {
    #[serde(default)]
    pub data: Option<TimelineData>,
}

impl TimelinePageResponse {
    #[must_use]
    pub fn into_media(self) -> Option<TimelineMedia> {
        self.data?.user?.edge_owner_to_timeline_media
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SharedDataEntries {
    #[serde(default)]
    pub profile_page: Vec<ProfilePageResponse>,
}

/// `window._sharedData` embedded in the HTML profile page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SharedData {
    #[serde(default)]
    pub entry_data: Option<SharedDataEntries>,
}

impl SharedData {
    #[must_use]
    pub fn into_user(self) -> Option<GraphUser> {
        self.entry_data?
            .profile_page
            .into_iter()
            .next()?
            .graphql?
            .user
    }
}

// ---------------------------------------------------------------------------
// Mobile shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MobileCaption {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageCandidate {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageVersions {
    #[serde(default)]
    pub candidates: Vec<ImageCandidate>,
}

/// One item from the mobile feed or clips endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MobileMediaItem {
    /// May be composite: `"{media_id}_{owner_id}"`.
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub pk: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    /// 1 image, 2 video, 8 carousel.
    #[serde(default)]
    pub media_type: Option<u8>,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub video_duration: Option<f64>,
    #[serde(default)]
    pub play_count: Option<u64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub comment_count: Option<u64>,
    #[serde(default)]
    pub taken_at: Option<i64>,
    #[serde(default)]
    pub caption: Option<MobileCaption>,
    #[serde(default)]
    pub image_versions2: Option<ImageVersions>,
    #[serde(default)]
    pub clips_metadata: Option<serde_json::Value>,
}

impl MobileMediaItem {
    /// Bare media ID: `pk` when present, else `id` with any `_owner` suffix
    /// removed.
    #[must_use]
    pub fn media_id(&self) -> Option<String> {
        if let Some(pk) = &self.pk {
            return Some(pk.clone());
        }
        let id = self.id.as_deref()?;
        let bare = id.split('_').next().unwrap_or(id);
        (!bare.is_empty()).then(|| bare.to_string())
    }
}

/// `GET /api/v1/feed/user/{user_id}/`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MobileFeedResponse {
    #[serde(default)]
    pub items: Vec<MobileMediaItem>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub next_max_id: Option<String>,
    #[serde(default)]
    pub more_available: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClipsItem {
    #[serde(default)]
    pub media: Option<MobileMediaItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClipsPagingInfo {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub max_id: Option<String>,
    #[serde(default)]
    pub more_available: bool,
}

/// `GET /api/v1/clips/user/`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClipsFeedResponse {
    #[serde(default)]
    pub items: Vec<ClipsItem>,
    #[serde(default)]
    pub paging_info: Option<ClipsPagingInfo>,
}

// ---------------------------------------------------------------------------
// Degraded profile shape
// ---------------------------------------------------------------------------

/// Profile recovered from `og:` meta tags when no JSON is embedded.
///
/// Counts are parsed from the abbreviated description text
/// (`"1.2M Followers, 500 Following, 1,234 Posts - ..."`), so they are
/// approximate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaProfile {
    pub handle: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub followers: u64,
    pub following: u64,
    pub posts: u64,
}
