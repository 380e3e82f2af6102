//! [`DocumentStore`] over Postgres JSONB documents.
//!
//! Each row keeps the full serialized record in `doc`. Columns outside `doc`
//! are copies used for keys, uniqueness and ordering, and are rewritten on
//! every put.

use async_trait::async_trait;
use pfdb_core::{ContentItem, HashtagCount, Profile};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::store::{ContentPage, ContentQuery, DocumentStore, Partition, SortKey, StoredContent};
use crate::DbError;

#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Unique violations become [`DbError::Conflict`]; everything else stays a
/// driver error.
fn write_err(e: sqlx::Error) -> DbError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DbError::Conflict(db.message().to_string())
        }
        _ => DbError::Sqlx(e),
    }
}

fn order_by(sort: SortKey) -> &'static str {
    match sort {
        SortKey::Recent => "posted_at DESC NULLS LAST, external_id COLLATE \"C\" ASC",
        SortKey::Likes => "like_count DESC, external_id COLLATE \"C\" ASC",
        SortKey::Comments => "comment_count DESC, external_id COLLATE \"C\" ASC",
        SortKey::Views => "COALESCE(view_count, 0) DESC, external_id COLLATE \"C\" ASC",
    }
}

/// Both partitions for one owner, with the sort columns.
const OWNER_CONTENT: &str = "\
    SELECT doc, external_id, posted_at, like_count, comment_count, view_count \
      FROM content_posts WHERE owner = $1 \
    UNION ALL \
    SELECT doc, external_id, posted_at, like_count, comment_count, view_count \
      FROM content_reels WHERE owner = $1";

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn find_profile(&self, handle: &str) -> Result<Option<Profile>, DbError> {
        let doc = sqlx::query_scalar::<_, Json<Profile>>("SELECT doc FROM profiles WHERE handle = $1")
            .bind(handle)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc.map(|Json(p)| p))
    }

    async fn find_profile_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Profile>, DbError> {
        let doc = sqlx::query_scalar::<_, Json<Profile>>(
            "SELECT doc FROM profiles WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc.map(|Json(p)| p))
    }

    async fn put_profile(&self, profile: &Profile) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO profiles (handle, external_id, doc) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (handle) DO UPDATE SET \
                 external_id = EXCLUDED.external_id, \
                 doc         = EXCLUDED.doc || jsonb_build_object( \
                     'avatar_mirrored_url', profiles.doc -> 'avatar_mirrored_url', \
                     'avatar_last_mirrored_source_url', \
                     profiles.doc -> 'avatar_last_mirrored_source_url'), \
                 updated_at  = NOW()",
        )
        .bind(&profile.handle)
        .bind(&profile.external_id)
        .bind(Json(profile))
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn rename_owner(&self, from: &str, to: &str) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            "UPDATE profiles SET \
                 handle     = $2, \
                 doc        = jsonb_set(doc, '{handle}', to_jsonb($2::text)), \
                 updated_at = NOW() \
             WHERE handle = $1",
        )
        .bind(from)
        .bind(to)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;
        if moved.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        for partition in Partition::ALL {
            let sql = format!(
                "UPDATE {} SET \
                     owner      = $2, \
                     doc        = jsonb_set(doc, '{{owner}}', to_jsonb($2::text)), \
                     updated_at = NOW() \
                 WHERE owner = $1",
                partition.table()
            );
            sqlx::query(&sql)
                .bind(from)
                .bind(to)
                .execute(&mut *tx)
                .await
                .map_err(write_err)?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search_profiles(&self, prefix: &str, limit: usize) -> Result<Vec<Profile>, DbError> {
        let docs = sqlx::query_scalar::<_, Json<Profile>>(
            "SELECT doc FROM profiles \
             WHERE starts_with(handle, $1) \
             ORDER BY handle \
             LIMIT $2",
        )
        .bind(prefix.to_ascii_lowercase())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(docs.into_iter().map(|Json(p)| p).collect())
    }

    async fn find_content(
        &self,
        owner: &str,
        external_id: &str,
    ) -> Result<Option<StoredContent>, DbError> {
        for partition in Partition::ALL {
            let sql = format!(
                "SELECT doc FROM {} WHERE owner = $1 AND external_id = $2",
                partition.table()
            );
            let doc = sqlx::query_scalar::<_, Json<ContentItem>>(&sql)
                .bind(owner)
                .bind(external_id)
                .fetch_optional(&self.pool)
                .await?;
            if let Some(Json(item)) = doc {
                return Ok(Some(StoredContent { partition, item }));
            }
        }
        Ok(None)
    }

    async fn put_content(&self, partition: Partition, item: &ContentItem) -> Result<(), DbError> {
        let other = match partition {
            Partition::Posts => Partition::Reels,
            Partition::Reels => Partition::Posts,
        };
        let elsewhere: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE owner = $1 AND external_id = $2)",
            other.table()
        ))
        .bind(&item.owner)
        .bind(&item.external_id)
        .fetch_one(&self.pool)
        .await?;
        if elsewhere {
            return Err(DbError::Conflict(format!(
                "item {} is already stored in {other}",
                item.external_id
            )));
        }

        let sql = format!(
            "INSERT INTO {table} \
                 (owner, external_id, shortcode, posted_at, like_count, comment_count, \
                  view_count, doc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (owner, external_id) DO UPDATE SET \
                 shortcode     = EXCLUDED.shortcode, \
                 posted_at     = EXCLUDED.posted_at, \
                 like_count    = EXCLUDED.like_count, \
                 comment_count = EXCLUDED.comment_count, \
                 view_count    = EXCLUDED.view_count, \
                 doc           = EXCLUDED.doc || jsonb_build_object( \
                     'asset_mirrored_url', {table}.doc -> 'asset_mirrored_url', \
                     'last_mirrored_source_url', {table}.doc -> 'last_mirrored_source_url'), \
                 updated_at    = NOW()",
            table = partition.table()
        );
        sqlx::query(&sql)
            .bind(&item.owner)
            .bind(&item.external_id)
            .bind(&item.shortcode)
            .bind(item.posted_at)
            .bind(to_i64(item.like_count))
            .bind(to_i64(item.comment_count))
            .bind(item.view_count.map(to_i64))
            .bind(Json(item))
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    async fn list_content(&self, owner: &str, query: ContentQuery) -> Result<ContentPage, DbError> {
        let query = query.clamped();
        let sql = format!(
            "SELECT doc FROM ({OWNER_CONTENT}) c ORDER BY {} LIMIT $2 OFFSET $3",
            order_by(query.sort)
        );
        let docs = sqlx::query_scalar::<_, Json<ContentItem>>(&sql)
            .bind(owner)
            .bind(i64::from(query.page_size))
            .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        let total = self.count_content(owner).await?;
        Ok(ContentPage {
            items: docs.into_iter().map(|Json(i)| i).collect(),
            page: query.page,
            page_size: query.page_size,
            sort: query.sort,
            total,
        })
    }

    async fn all_content(&self, owner: &str) -> Result<Vec<ContentItem>, DbError> {
        let sql = format!(
            "SELECT doc FROM ({OWNER_CONTENT}) c ORDER BY {}",
            order_by(SortKey::Recent)
        );
        let docs = sqlx::query_scalar::<_, Json<ContentItem>>(&sql)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        Ok(docs.into_iter().map(|Json(i)| i).collect())
    }

    async fn content_ids(&self, owner: &str) -> Result<Vec<String>, DbError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT external_id FROM content_posts WHERE owner = $1 \
             UNION ALL \
             SELECT external_id FROM content_reels WHERE owner = $1",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn count_content(&self, owner: &str) -> Result<u64, DbError> {
        let n: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM content_posts WHERE owner = $1) \
                  + (SELECT COUNT(*) FROM content_reels WHERE owner = $1)",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    async fn top_hashtags(
        &self,
        owner: &str,
        limit: usize,
    ) -> Result<Vec<HashtagCount>, DbError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT tag, COUNT(*) AS n FROM ( \
                 SELECT jsonb_array_elements_text(doc->'hashtags') AS tag \
                   FROM content_posts WHERE owner = $1 \
                 UNION ALL \
                 SELECT jsonb_array_elements_text(doc->'hashtags') \
                   FROM content_reels WHERE owner = $1 \
             ) t \
             GROUP BY tag \
             ORDER BY n DESC, tag COLLATE \"C\" ASC \
             LIMIT $2",
        )
        .bind(owner)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(tag, n)| HashtagCount {
                tag,
                count: u64::try_from(n).unwrap_or(0),
            })
            .collect())
    }

    async fn update_content_mirror(
        &self,
        owner: &str,
        external_id: &str,
        mirrored_url: &str,
        source_url: &str,
    ) -> Result<bool, DbError> {
        for partition in Partition::ALL {
            let sql = format!(
                "UPDATE {} SET \
                     doc = jsonb_set( \
                         jsonb_set(doc, '{{asset_mirrored_url}}', to_jsonb($3::text)), \
                         '{{last_mirrored_source_url}}', to_jsonb($4::text)), \
                     updated_at = NOW() \
                 WHERE owner = $1 AND external_id = $2",
                partition.table()
            );
            let result = sqlx::query(&sql)
                .bind(owner)
                .bind(external_id)
                .bind(mirrored_url)
                .bind(source_url)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() > 0 {
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
        let result = sqlx::query(
            "UPDATE profiles SET \
                 doc = jsonb_set( \
                     jsonb_set(doc, '{avatar_mirrored_url}', to_jsonb($2::text)), \
                     '{avatar_last_mirrored_source_url}', to_jsonb($3::text)), \
                 updated_at = NOW() \
             WHERE handle = $1",
        )
        .bind(handle)
        .bind(mirrored_url)
        .bind(source_url)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
