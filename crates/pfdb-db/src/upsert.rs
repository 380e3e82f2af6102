//! Idempotent merge of freshly normalized records into the store.
//!
//! Re-running an upsert with the same input leaves the store unchanged.
//! Upstream-sourced fields are replaced; mirror and fetch bookkeeping always
//! survive.

use pfdb_core::{ContentItem, Profile};
use serde::Serialize;

use crate::store::{DocumentStore, Partition};
use crate::DbError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub saved: usize,
    pub skipped: usize,
}

/// Merges `fresh` into the stored profile and returns the stored result.
///
/// Lookup is by `external_id` first, then by handle. When a known
/// `external_id` arrives under a new handle, the stored profile and its
/// content follow the rename.
///
/// # Errors
///
/// - [`DbError::Conflict`] when the handle is held by a profile with a
///   different `external_id`.
/// - Any store error.
pub async fn upsert_profile(store: &dyn DocumentStore, fresh: &Profile) -> Result<Profile, DbError> {
    let by_id = match fresh.external_id.as_deref() {
        Some(id) => store.find_profile_by_external_id(id).await?,
        None => None,
    };
    let by_handle = store.find_profile(&fresh.handle).await?;

    let base = match (by_id, by_handle) {
        (Some(existing), by_handle) if existing.handle != fresh.handle => {
            if let Some(holder) = by_handle {
                return Err(handle_conflict(&fresh.handle, &holder, fresh));
            }
            tracing::info!(
                from = %existing.handle,
                to = %fresh.handle,
                external_id = ?fresh.external_id,
                "profile handle changed upstream, following rename"
            );
            store.rename_owner(&existing.handle, &fresh.handle).await?;
            Some(existing)
        }
        (Some(existing), _) => Some(existing),
        (None, Some(holder)) => {
            let ids_differ = matches!(
                (holder.external_id.as_deref(), fresh.external_id.as_deref()),
                (Some(a), Some(b)) if a != b
            );
            if ids_differ {
                return Err(handle_conflict(&fresh.handle, &holder, fresh));
            }
            Some(holder)
        }
        (None, None) => None,
    };

    let merged = match base {
        Some(mut stored) => {
            stored.apply_upstream(fresh);
            stored
        }
        None => fresh.clone(),
    };
    store.put_profile(&merged).await?;
    Ok(merged)
}

fn handle_conflict(handle: &str, holder: &Profile, fresh: &Profile) -> DbError {
    DbError::Conflict(format!(
        "handle @{handle} belongs to external id {:?}, not {:?}",
        holder.external_id, fresh.external_id
    ))
}

/// Writes `items` for `owner`, one at a time.
///
/// Known items are merged in place in the partition that already holds them;
/// new items are routed by [`Partition::sniff`]. A failing item is logged and
/// counted as skipped.
///
/// # Errors
///
/// Returns the last store error when nothing could be saved because the
/// store itself is failing.
pub async fn upsert_content(
    store: &dyn DocumentStore,
    owner: &str,
    items: &[ContentItem],
) -> Result<UpsertSummary, DbError> {
    let mut summary = UpsertSummary::default();
    let mut store_failure = None;

    for item in items {
        match upsert_one(store, owner, item).await {
            Ok(()) => summary.saved += 1,
            Err(e) => {
                tracing::error!(
                    owner,
                    external_id = %item.external_id,
                    error = %e,
                    "content upsert failed, skipping item"
                );
                summary.skipped += 1;
                if e.is_unavailable() {
                    store_failure = Some(e);
                }
            }
        }
    }

    match store_failure {
        Some(e) if summary.saved == 0 => Err(e),
        _ => Ok(summary),
    }
}

async fn upsert_one(
    store: &dyn DocumentStore,
    owner: &str,
    item: &ContentItem,
) -> Result<(), DbError> {
    if item.owner != owner {
        return Err(DbError::Conflict(format!(
            "item {} is owned by @{}, not @{owner}",
            item.external_id, item.owner
        )));
    }
    match store.find_content(owner, &item.external_id).await? {
        Some(stored) => {
            let mut merged = stored.item;
            merged.merge_from(item);
            store.put_content(stored.partition, &merged).await
        }
        None => store.put_content(Partition::sniff(item), item).await,
    }
}

#[cfg(test)]
#[path = "upsert_test.rs"]
mod tests;
