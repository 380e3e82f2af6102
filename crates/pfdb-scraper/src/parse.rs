//! Caption and count parsing shared by the normalizer and the HTML fallback.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static HASHTAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#[\w]+").expect("valid hashtag regex"));
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@[\w.]+").expect("valid mention regex"));

/// Hashtags in `caption`, without the `#`, lower-cased, first occurrence order.
///
/// `\w` matches Unicode word characters, so `#café` yields `café`.
#[must_use]
pub fn extract_hashtags(caption: Option<&str>) -> Vec<String> {
    collect_tokens(&HASHTAG_RE, caption, '#')
}

/// Mentioned handles in `caption`, without the `@`, lower-cased, first
/// occurrence order. A trailing `.` (sentence end) is not part of a handle.
#[must_use]
pub fn extract_mentions(caption: Option<&str>) -> Vec<String> {
    collect_tokens(&MENTION_RE, caption, '@')
}

fn collect_tokens(re: &Regex, caption: Option<&str>, sigil: char) -> Vec<String> {
    let Some(caption) = caption else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in re.find_iter(caption) {
        let token = m
            .as_str()
            .trim_start_matches(sigil)
            .trim_end_matches('.')
            .to_lowercase();
        if token.is_empty() {
            continue;
        }
        if seen.insert(token.clone()) {
            out.push(token);
        }
    }
    out
}

/// Converts abbreviated counts such as `"1.2M"`, `"15.3K"` or `"1,234"`.
///
/// Suffixes are case-insensitive: K = 10³, M = 10⁶, B = 10⁹. Returns `None`
/// for anything that is not a non-negative number.
#[must_use]
pub fn parse_count(raw: &str) -> Option<u64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }

    let (number, multiplier) = match cleaned.chars().last() {
        Some('k' | 'K') => (&cleaned[..cleaned.len() - 1], 1_000.0),
        Some('m' | 'M') => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        Some('b' | 'B') => (&cleaned[..cleaned.len() - 1], 1_000_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some((value * multiplier).round() as u64)
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
