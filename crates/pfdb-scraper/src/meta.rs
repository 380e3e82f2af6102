//! Profile extraction from the HTML profile page.
//!
//! Two sources, tried in order by the HTML strategy: the `window._sharedData`
//! JSON blob that older page builds embed, and the `og:` meta tags every build
//! carries. Meta tags only give approximate counts.

use std::sync::LazyLock;

use regex::Regex;

use crate::parse::parse_count;
use crate::types::{GraphUser, MetaProfile, SharedData};

static SHARED_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)window\._sharedData\s*=\s*(\{.*?\})\s*;\s*</script>")
        .expect("valid sharedData regex")
});
static META_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("valid regex"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\b(property|name|content)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid attribute regex")
});
static FOLLOWERS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([\d][\d,.]*[kmb]?)\s+Followers").expect("valid followers regex")
});
static FOLLOWING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([\d][\d,.]*[kmb]?)\s+Following").expect("valid following regex")
});
static POSTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([\d][\d,.]*[kmb]?)\s+Posts").expect("valid posts regex")
});

/// The graph user embedded as `window._sharedData`, if the page has one.
#[must_use]
pub fn extract_shared_data_user(html: &str) -> Option<GraphUser> {
    let captures = SHARED_DATA_RE.captures(html)?;
    let json = captures.get(1)?.as_str();
    match serde_json::from_str::<SharedData>(json) {
        Ok(shared) => shared.into_user(),
        Err(e) => {
            tracing::debug!(error = %e, "window._sharedData present but unparseable");
            None
        }
    }
}

/// Profile fields recovered from `og:` meta tags. `None` when the page has no
/// `og:title`, which is what login walls and error pages look like.
#[must_use]
pub fn extract_meta_profile(html: &str, handle: &str) -> Option<MetaProfile> {
    let mut title = None;
    let mut description = None;
    let mut image = None;

    for tag in META_TAG_RE.find_iter(html) {
        let mut key = None;
        let mut content = None;
        for attr in ATTR_RE.captures_iter(tag.as_str()) {
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .map(|m| decode_entities(m.as_str()));
            match attr.get(1).map(|m| m.as_str().to_ascii_lowercase()).as_deref() {
                Some("content") => content = value,
                Some(_) => key = value,
                None => {}
            }
        }
        match (key.as_deref(), content) {
            (Some("og:title"), Some(c)) => title = Some(c),
            (Some("og:description"), Some(c)) => description = Some(c),
            (Some("og:image"), Some(c)) => image = Some(c),
            _ => {}
        }
    }

    let title = title.filter(|t| !t.trim().is_empty())?;
    let count = |re: &Regex| -> u64 {
        description
            .as_deref()
            .and_then(|d| re.captures(d))
            .and_then(|c| c.get(1))
            .and_then(|m| parse_count(m.as_str()))
            .unwrap_or(0)
    };

    Some(MetaProfile {
        handle: handle.to_string(),
        followers: count(&FOLLOWERS_RE),
        following: count(&FOLLOWING_RE),
        posts: count(&POSTS_RE),
        title: Some(title),
        description,
        image,
    })
}

/// Display name from an `og:title` such as
/// `"National Geographic (@natgeo) • Instagram photos and videos"`.
#[must_use]
pub fn display_name_from_title(title: &str) -> Option<String> {
    let name = title.split(" (@").next().unwrap_or(title).trim();
    (!name.is_empty() && !name.starts_with('@')).then(|| name.to_string())
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&#064;", "@")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
