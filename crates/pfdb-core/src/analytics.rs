//! Engagement and influence scoring.
//!
//! Everything here is a pure function of a [`Profile`] and its stored
//! [`ContentItem`]s. Snapshots are always rebuilt from scratch; nothing
//! patches a previous snapshot.

use std::collections::HashMap;

use crate::model::{AnalyticsSnapshot, ContentItem, HashtagCount, KindBreakdown, Profile};

/// How many hashtags a snapshot reports.
pub const TOP_HASHTAGS: usize = 10;

const FOLLOWER_TIERS: &[(u64, f64)] = &[
    (10_000_000, 35.0),
    (1_000_000, 30.0),
    (100_000, 24.0),
    (10_000, 17.0),
    (1_000, 10.0),
    (1, 4.0),
];

/// Engagement rate thresholds, in percent.
const ENGAGEMENT_TIERS: &[(f64, f64)] = &[
    (10.0, 25.0),
    (5.0, 20.0),
    (3.0, 15.0),
    (1.0, 10.0),
    (f64::MIN_POSITIVE, 5.0),
];

const VOLUME_TIERS: &[(u64, f64)] = &[
    (1_000, 15.0),
    (500, 12.0),
    (100, 9.0),
    (50, 6.0),
    (10, 3.0),
    (1, 1.0),
];

const VERIFIED_POINTS: f64 = 10.0;
const BUSINESS_POINTS: f64 = 5.0;
const FLAGS_CAP: f64 = 15.0;
const DIVERSITY_POINTS_PER_KIND: f64 = 2.5;
const DIVERSITY_CAP: f64 = 10.0;

/// Builds a fresh snapshot for `profile` from `items`.
///
/// Total for empty input: every aggregate is zero and the influence score is
/// derived from profile-only signals.
#[must_use]
pub fn compute_analytics(profile: &Profile, items: &[ContentItem]) -> AnalyticsSnapshot {
    let mut breakdown = KindBreakdown::default();
    let mut total_likes: u64 = 0;
    let mut total_comments: u64 = 0;
    let mut total_views: u64 = 0;
    let mut viewable: u64 = 0;
    let mut tag_counts: HashMap<&str, u64> = HashMap::new();

    for item in items {
        breakdown.record(item.kind);
        total_likes = total_likes.saturating_add(item.like_count);
        total_comments = total_comments.saturating_add(item.comment_count);
        if let Some(views) = item.view_count {
            total_views = total_views.saturating_add(views);
            viewable += 1;
        }
        for tag in &item.hashtags {
            *tag_counts.entry(tag.as_str()).or_insert(0) += 1;
        }
    }

    let item_count = items.len() as u64;
    let avg_likes = average(total_likes, item_count);
    let avg_comments = average(total_comments, item_count);
    let avg_views = average(total_views, viewable);
    let engagement_rate = engagement_rate(avg_likes, avg_comments, profile.follower_count);

    let mut top_hashtags: Vec<HashtagCount> = tag_counts
        .into_iter()
        .map(|(tag, count)| HashtagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    top_hashtags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    top_hashtags.truncate(TOP_HASHTAGS);

    let influence_score = influence_score(profile, engagement_rate, item_count, &breakdown);

    AnalyticsSnapshot {
        item_count,
        total_likes,
        total_comments,
        total_views,
        avg_likes,
        avg_comments,
        avg_views,
        kind_breakdown: breakdown,
        top_hashtags,
        engagement_rate,
        influence_score,
    }
}

/// Bounded influence score in `[0, 100]`, one decimal.
///
/// Sum of five capped sub-scores: follower tier (35), engagement tier (25),
/// content volume (15), verified/business flags (15) and kind diversity (10).
/// Content volume uses the larger of the profile's advertised count and the
/// number of items actually stored.
#[must_use]
pub fn influence_score(
    profile: &Profile,
    engagement_rate: f64,
    stored_items: u64,
    breakdown: &KindBreakdown,
) -> f64 {
    let followers = tier(profile.follower_count, FOLLOWER_TIERS);

    let engagement = if engagement_rate.is_finite() {
        ENGAGEMENT_TIERS
            .iter()
            .find(|(threshold, _)| engagement_rate >= *threshold)
            .map_or(0.0, |(_, points)| *points)
    } else {
        0.0
    };

    let volume = tier(profile.content_count.max(stored_items), VOLUME_TIERS);

    let mut flags = 0.0;
    if profile.is_verified {
        flags += VERIFIED_POINTS;
    }
    if profile.is_business {
        flags += BUSINESS_POINTS;
    }
    let flags = f64::min(flags, FLAGS_CAP);

    #[allow(clippy::cast_precision_loss)]
    let diversity = f64::min(
        breakdown.distinct_kinds() as f64 * DIVERSITY_POINTS_PER_KIND,
        DIVERSITY_CAP,
    );

    let total = followers + engagement + volume + flags + diversity;
    round_to(total.clamp(0.0, 100.0), 1)
}

fn tier(value: u64, tiers: &[(u64, f64)]) -> f64 {
    tiers
        .iter()
        .find(|(threshold, _)| value >= *threshold)
        .map_or(0.0, |(_, points)| *points)
}

fn engagement_rate(avg_likes: f64, avg_comments: f64, followers: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let denominator = followers.max(1) as f64;
    round_to((avg_likes + avg_comments) / denominator * 100.0, 2)
}

#[allow(clippy::cast_precision_loss)]
fn average(total: u64, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    round_to(total as f64 / count as f64, 2)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentKind;

    fn profile(followers: u64) -> Profile {
        let mut p = Profile::new("someone");
        p.follower_count = followers;
        p
    }

    fn item(id: &str, kind: ContentKind, likes: u64, comments: u64, tags: &[&str]) -> ContentItem {
        ContentItem {
            external_id: id.to_string(),
            shortcode: format!("SC{id}"),
            owner: "someone".to_string(),
            kind,
            caption: None,
            asset_source_url: None,
            asset_mirrored_url: None,
            last_mirrored_source_url: None,
            like_count: likes,
            comment_count: comments,
            view_count: kind.is_video_like().then_some(1_000),
            duration_secs: None,
            posted_at: None,
            hashtags: tags.iter().map(|t| (*t).to_string()).collect(),
            mentions: vec![],
        }
    }

    #[test]
    fn empty_items_yield_zero_aggregates() {
        let snap = compute_analytics(&profile(500), &[]);
        assert_eq!(snap.item_count, 0);
        assert!(snap.avg_likes.abs() < f64::EPSILON);
        assert!(snap.engagement_rate.abs() < f64::EPSILON);
        assert!(snap.top_hashtags.is_empty());
        // 500 followers lands in the lowest non-zero follower tier.
        assert!((snap.influence_score - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn all_zero_profile_scores_zero() {
        let snap = compute_analytics(&profile(0), &[]);
        assert!(snap.influence_score.abs() < f64::EPSILON);
    }

    #[test]
    fn engagement_rate_uses_averages_over_followers() {
        let items = vec![
            item("1", ContentKind::Image, 100, 10, &[]),
            item("2", ContentKind::Image, 50, 0, &[]),
        ];
        let snap = compute_analytics(&profile(1_000), &items);
        assert!((snap.avg_likes - 75.0).abs() < f64::EPSILON);
        assert!((snap.avg_comments - 5.0).abs() < f64::EPSILON);
        assert!((snap.engagement_rate - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn engagement_rate_with_zero_followers_divides_by_one() {
        let items = vec![item("1", ContentKind::Image, 3, 1, &[])];
        let snap = compute_analytics(&profile(0), &items);
        assert!((snap.engagement_rate - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn views_average_only_over_video_like_items() {
        let items = vec![
            item("1", ContentKind::Image, 0, 0, &[]),
            item("2", ContentKind::Reel, 0, 0, &[]),
        ];
        let snap = compute_analytics(&profile(10), &items);
        assert_eq!(snap.total_views, 1_000);
        assert!((snap.avg_views - 1_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn top_hashtags_sorted_by_count_then_alpha() {
        let items = vec![
            item("1", ContentKind::Image, 0, 0, &["zeta", "alpha"]),
            item("2", ContentKind::Image, 0, 0, &["zeta", "beta"]),
            item("3", ContentKind::Image, 0, 0, &["beta"]),
        ];
        let snap = compute_analytics(&profile(10), &items);
        let tags: Vec<_> = snap.top_hashtags.iter().map(|h| h.tag.as_str()).collect();
        assert_eq!(tags, vec!["beta", "zeta", "alpha"]);
        assert_eq!(snap.top_hashtags[0].count, 2);
    }

    #[test]
    fn top_hashtags_capped_at_ten() {
        let tags: Vec<String> = (0..15).map(|i| format!("tag{i:02}")).collect();
        let tag_refs: Vec<&str> = tags.iter().map(String::as_str).collect();
        let items = vec![item("1", ContentKind::Image, 0, 0, &tag_refs)];
        let snap = compute_analytics(&profile(10), &items);
        assert_eq!(snap.top_hashtags.len(), TOP_HASHTAGS);
        assert_eq!(snap.top_hashtags[0].tag, "tag00");
    }

    #[test]
    fn score_is_bounded_at_extremes() {
        let mut p = profile(u64::MAX);
        p.is_verified = true;
        p.is_business = true;
        p.content_count = u64::MAX;
        let items = vec![
            item("1", ContentKind::Image, u64::MAX, u64::MAX, &[]),
            item("2", ContentKind::Carousel, u64::MAX, u64::MAX, &[]),
            item("3", ContentKind::Video, u64::MAX, u64::MAX, &[]),
            item("4", ContentKind::Reel, u64::MAX, u64::MAX, &[]),
        ];
        let snap = compute_analytics(&p, &items);
        assert!((snap.influence_score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn score_ignores_non_finite_engagement() {
        let p = profile(1);
        let score = influence_score(&p, f64::NAN, 0, &KindBreakdown::default());
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn diversity_awards_per_kind() {
        let p = profile(0);
        let mut b = KindBreakdown::default();
        b.record(ContentKind::Image);
        b.record(ContentKind::Reel);
        // Volume tier for two stored items is 1 point.
        let score = influence_score(&p, 0.0, 2, &b);
        assert!((score - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn compute_is_deterministic() {
        let items = vec![
            item("1", ContentKind::Image, 5, 1, &["a", "b"]),
            item("2", ContentKind::Video, 7, 2, &["b", "c"]),
        ];
        let p = profile(2_000);
        assert_eq!(compute_analytics(&p, &items), compute_analytics(&p, &items));
    }
}
