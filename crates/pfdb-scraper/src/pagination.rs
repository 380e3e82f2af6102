//! De-duplication across pages and strategies.
//!
//! Strategies return overlapping pages: the primary payload's first twelve
//! items reappear on page one of the GraphQL timeline, the mobile feed
//! repeats both, and so on. [`ContentAggregator`] is the single place that
//! decides whether an item is new.
//!
//! ## Rules
//!
//! - Identity is `external_id`; the first sighting wins.
//! - IDs in `already_have` (typically what the store holds) are never
//!   accepted again.
//! - Items that failed normalization are dropped and counted, never fatal.
//! - Output order is acceptance order: source order within a strategy,
//!   strategies in invocation order.

use std::collections::HashSet;

use pfdb_core::ContentItem;

use crate::error::ScraperError;

#[derive(Debug)]
pub struct ContentAggregator {
    seen: HashSet<String>,
    accepted: Vec<ContentItem>,
    want: usize,
    rejected: usize,
}

impl ContentAggregator {
    #[must_use]
    pub fn new<I>(already_have: I, want: usize) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            seen: already_have.into_iter().collect(),
            accepted: Vec::with_capacity(want.min(256)),
            want,
            rejected: 0,
        }
    }

    /// Offers one page of normalization results. Returns how many items were
    /// new. Stops accepting once `want` is reached.
    pub fn absorb<I>(&mut self, strategy: &str, page: I) -> usize
    where
        I: IntoIterator<Item = Result<ContentItem, ScraperError>>,
    {
        let mut added = 0;
        for result in page {
            if self.is_satisfied() {
                break;
            }
            match result {
                Ok(item) => {
                    if self.seen.insert(item.external_id.clone()) {
                        self.accepted.push(item);
                        added += 1;
                    }
                }
                Err(e) => {
                    self.rejected += 1;
                    tracing::warn!(strategy, error = %e, "dropping content item that failed normalization");
                }
            }
        }
        added
    }

    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.accepted.len() >= self.want
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    #[must_use]
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    #[must_use]
    pub fn into_items(mut self) -> Vec<ContentItem> {
        self.accepted.truncate(self.want);
        self.accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pfdb_core::ContentKind;

    fn item(id: &str, likes: u64) -> Result<ContentItem, ScraperError> {
        Ok(ContentItem {
            external_id: id.to_owned(),
            shortcode: format!("SC{id}"),
            owner: "x".to_owned(),
            kind: ContentKind::Image,
            caption: None,
            asset_source_url: None,
            asset_mirrored_url: None,
            last_mirrored_source_url: None,
            like_count: likes,
            comment_count: 0,
            view_count: None,
            duration_secs: None,
            posted_at: None,
            hashtags: vec![],
            mentions: vec![],
        })
    }

    #[test]
    fn first_seen_wins_across_pages() {
        let mut agg = ContentAggregator::new(Vec::new(), 10);
        assert_eq!(agg.absorb("a", vec![item("1", 1), item("2", 1)]), 2);
        assert_eq!(agg.absorb("b", vec![item("2", 99), item("3", 1)]), 1);
        let items = agg.into_items();
        let ids: Vec<_> = items.iter().map(|i| i.external_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(items[1].like_count, 1);
    }

    #[test]
    fn already_have_ids_are_skipped() {
        let mut agg = ContentAggregator::new(vec!["1".to_owned()], 10);
        assert_eq!(agg.absorb("a", vec![item("1", 1), item("2", 1)]), 1);
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn stops_at_want() {
        let mut agg = ContentAggregator::new(Vec::new(), 2);
        let added = agg.absorb("a", vec![item("1", 0), item("2", 0), item("3", 0)]);
        assert_eq!(added, 2);
        assert!(agg.is_satisfied());
        assert_eq!(agg.into_items().len(), 2);
    }

    #[test]
    fn invalid_items_are_counted_and_dropped() {
        let mut agg = ContentAggregator::new(Vec::new(), 10);
        let added = agg.absorb(
            "a",
            vec![
                item("1", 0),
                Err(ScraperError::Validation {
                    reason: "media node without id".to_owned(),
                }),
            ],
        );
        assert_eq!(added, 1);
        assert_eq!(agg.rejected(), 1);
    }

    #[test]
    fn zero_want_is_immediately_satisfied() {
        let agg = ContentAggregator::new(Vec::new(), 0);
        assert!(agg.is_satisfied());
        assert!(agg.is_empty());
    }
}
