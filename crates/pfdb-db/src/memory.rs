//! In-process [`DocumentStore`] for tests and ephemeral runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use pfdb_core::{ContentItem, HashtagCount, Profile};
use tokio::sync::RwLock;

use crate::store::{
    compare_for, ContentPage, ContentQuery, DocumentStore, Partition, SortKey, StoredContent,
};
use crate::DbError;

type ContentKey = (String, String);

#[derive(Debug, Default)]
struct Inner {
    profiles: BTreeMap<String, Profile>,
    posts: BTreeMap<ContentKey, ContentItem>,
    reels: BTreeMap<ContentKey, ContentItem>,
}

impl Inner {
    fn partition(&self, partition: Partition) -> &BTreeMap<ContentKey, ContentItem> {
        match partition {
            Partition::Posts => &self.posts,
            Partition::Reels => &self.reels,
        }
    }

    fn partition_mut(&mut self, partition: Partition) -> &mut BTreeMap<ContentKey, ContentItem> {
        match partition {
            Partition::Posts => &mut self.posts,
            Partition::Reels => &mut self.reels,
        }
    }

    fn owned_by<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a ContentItem> + 'a {
        self.posts
            .values()
            .chain(self.reels.values())
            .filter(move |i| i.owner == owner)
    }
}

/// Everything lives behind one `RwLock`; a write holds the whole store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with [`DbError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of items stored in `partition` across all owners.
    pub async fn partition_len(&self, partition: Partition) -> usize {
        self.inner.read().await.partition(partition).len()
    }

    fn check(&self) -> Result<(), DbError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(DbError::Unavailable("memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

fn key(owner: &str, external_id: &str) -> ContentKey {
    (owner.to_string(), external_id.to_string())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_profile(&self, handle: &str) -> Result<Option<Profile>, DbError> {
        self.check()?;
        Ok(self.inner.read().await.profiles.get(handle).cloned())
    }

    async fn find_profile_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Profile>, DbError> {
        self.check()?;
        Ok(self
            .inner
            .read()
            .await
            .profiles
            .values()
            .find(|p| p.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn put_profile(&self, profile: &Profile) -> Result<(), DbError> {
        self.check()?;
        let mut inner = self.inner.write().await;
        if let Some(id) = profile.external_id.as_deref() {
            if let Some(other) = inner
                .profiles
                .values()
                .find(|p| p.handle != profile.handle && p.external_id.as_deref() == Some(id))
            {
                return Err(DbError::Conflict(format!(
                    "external id {id} already belongs to @{}",
                    other.handle
                )));
            }
        }
        let mut profile = profile.clone();
        if let Some(stored) = inner.profiles.get(&profile.handle) {
            profile.avatar_mirrored_url.clone_from(&stored.avatar_mirrored_url);
            profile
                .avatar_last_mirrored_source_url
                .clone_from(&stored.avatar_last_mirrored_source_url);
        }
        inner.profiles.insert(profile.handle.clone(), profile);
        Ok(())
    }

    async fn rename_owner(&self, from: &str, to: &str) -> Result<(), DbError> {
        self.check()?;
        let mut inner = self.inner.write().await;
        if inner.profiles.contains_key(to) {
            return Err(DbError::Conflict(format!("handle @{to} is already stored")));
        }
        let mut profile = inner.profiles.remove(from).ok_or(DbError::NotFound)?;
        profile.handle = to.to_string();
        inner.profiles.insert(to.to_string(), profile);

        for partition in Partition::ALL {
            let map = inner.partition_mut(partition);
            let moved: Vec<ContentKey> = map.keys().filter(|(o, _)| o == from).cloned().collect();
            for old in moved {
                if let Some(mut item) = map.remove(&old) {
                    item.owner = to.to_string();
                    map.insert(key(to, &old.1), item);
                }
            }
        }
        Ok(())
    }

    async fn search_profiles(&self, prefix: &str, limit: usize) -> Result<Vec<Profile>, DbError> {
        self.check()?;
        let prefix = prefix.to_ascii_lowercase();
        Ok(self
            .inner
            .read()
            .await
            .profiles
            .range(prefix.clone()..)
            .take_while(|(h, _)| h.starts_with(&prefix))
            .take(limit)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn find_content(
        &self,
        owner: &str,
        external_id: &str,
    ) -> Result<Option<StoredContent>, DbError> {
        self.check()?;
        let inner = self.inner.read().await;
        let k = key(owner, external_id);
        Ok(Partition::ALL.into_iter().find_map(|partition| {
            inner.partition(partition).get(&k).map(|item| StoredContent {
                partition,
                item: item.clone(),
            })
        }))
    }

    async fn put_content(&self, partition: Partition, item: &ContentItem) -> Result<(), DbError> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let k = key(&item.owner, &item.external_id);
        let other = match partition {
            Partition::Posts => Partition::Reels,
            Partition::Reels => Partition::Posts,
        };
        if inner.partition(other).contains_key(&k) {
            return Err(DbError::Conflict(format!(
                "item {} is already stored in {other}",
                item.external_id
            )));
        }
        let map = inner.partition_mut(partition);
        let mut item = item.clone();
        if let Some(stored) = map.get(&k) {
            item.asset_mirrored_url.clone_from(&stored.asset_mirrored_url);
            item.last_mirrored_source_url
                .clone_from(&stored.last_mirrored_source_url);
        }
        map.insert(k, item);
        Ok(())
    }

    async fn list_content(&self, owner: &str, query: ContentQuery) -> Result<ContentPage, DbError> {
        self.check()?;
        let query = query.clamped();
        let inner = self.inner.read().await;
        let mut items: Vec<&ContentItem> = inner.owned_by(owner).collect();
        items.sort_by(|a, b| compare_for(query.sort, a, b));
        let total = items.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let page = items
            .into_iter()
            .skip(offset)
            .take(query.page_size as usize)
            .cloned()
            .collect();
        Ok(ContentPage {
            items: page,
            page: query.page,
            page_size: query.page_size,
            sort: query.sort,
            total,
        })
    }

    async fn all_content(&self, owner: &str) -> Result<Vec<ContentItem>, DbError> {
        self.check()?;
        let inner = self.inner.read().await;
        let mut items: Vec<ContentItem> = inner.owned_by(owner).cloned().collect();
        items.sort_by(|a, b| compare_for(SortKey::Recent, a, b));
        Ok(items)
    }

    async fn content_ids(&self, owner: &str) -> Result<Vec<String>, DbError> {
        self.check()?;
        Ok(self
            .inner
            .read()
            .await
            .owned_by(owner)
            .map(|i| i.external_id.clone())
            .collect())
    }

    async fn count_content(&self, owner: &str) -> Result<u64, DbError> {
        self.check()?;
        Ok(self.inner.read().await.owned_by(owner).count() as u64)
    }

    async fn top_hashtags(
        &self,
        owner: &str,
        limit: usize,
    ) -> Result<Vec<HashtagCount>, DbError> {
        self.check()?;
        let inner = self.inner.read().await;
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for item in inner.owned_by(owner) {
            for tag in &item.hashtags {
                *counts.entry(tag.as_str()).or_insert(0) += 1;
            }
        }
        let mut tags: Vec<HashtagCount> = counts
            .into_iter()
            .map(|(tag, count)| HashtagCount {
                tag: tag.to_string(),
                count,
            })
            .collect();
        tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        tags.truncate(limit);
        Ok(tags)
    }

    async fn update_content_mirror(
        &self,
        owner: &str,
        external_id: &str,
        mirrored_url: &str,
        source_url: &str,
    ) -> Result<bool, DbError> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let k = key(owner, external_id);
        for partition in Partition::ALL {
            if let Some(item) = inner.partition_mut(partition).get_mut(&k) {
                item.asset_mirrored_url = Some(mirrored_url.to_string());
                item.last_mirrored_source_url = Some(source_url.to_string());
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn update_avatar_mirror(
        &self,
        handle: &str,
        mirrored_url: &str,
        source_url: &str,
    ) -> Result<bool, DbError> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let Some(profile) = inner.profiles.get_mut(handle) else {
            return Ok(false);
        };
        profile.avatar_mirrored_url = Some(mirrored_url.to_string());
        profile.avatar_last_mirrored_source_url = Some(source_url.to_string());
        Ok(true)
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
