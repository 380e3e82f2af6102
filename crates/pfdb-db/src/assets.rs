//! Durable object storage for mirrored media.
//!
//! Objects are addressed by `(folder, key)`. Both parts must be a single
//! path segment of `[A-Za-z0-9._-]` that does not start with a dot.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::DbError;

#[async_trait]
pub trait DurableAssetStore: Send + Sync {
    /// Stores `bytes` and returns the object's public URL. Overwrites.
    async fn put(&self, folder: &str, key: &str, bytes: &[u8]) -> Result<String, DbError>;

    async fn exists(&self, folder: &str, key: &str) -> Result<bool, DbError>;

    fn public_url(&self, folder: &str, key: &str) -> String;
}

fn check_segment(segment: &str) -> Result<(), DbError> {
    let ok = !segment.is_empty()
        && !segment.starts_with('.')
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if ok {
        Ok(())
    } else {
        Err(DbError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid asset path segment '{segment}'"),
        )))
    }
}

/// Files under `root/{folder}/{key}`, served from `public_base_url`.
#[derive(Debug, Clone)]
pub struct FsAssetStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsAssetStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, folder: &str, key: &str) -> Result<PathBuf, DbError> {
        check_segment(folder)?;
        check_segment(key)?;
        Ok(self.root.join(folder).join(key))
    }
}

#[async_trait]
impl DurableAssetStore for FsAssetStore {
    async fn put(&self, folder: &str, key: &str, bytes: &[u8]) -> Result<String, DbError> {
        let path = self.path_of(folder, key)?;
        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;

        // Write-then-rename so readers never see a partial object.
        let tmp = dir.join(format!(".{key}.partial"));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "asset stored");
        Ok(self.public_url(folder, key))
    }

    async fn exists(&self, folder: &str, key: &str) -> Result<bool, DbError> {
        let path = self.path_of(folder, key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    fn public_url(&self, folder: &str, key: &str) -> String {
        format!("{}/{folder}/{key}", self.public_base_url)
    }
}

/// Objects kept in memory; for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryAssetStore {
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryAssetStore {
    pub const BASE_URL: &'static str = "memory://assets";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, folder: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(folder.to_string(), key.to_string()))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl DurableAssetStore for MemoryAssetStore {
    async fn put(&self, folder: &str, key: &str, bytes: &[u8]) -> Result<String, DbError> {
        check_segment(folder)?;
        check_segment(key)?;
        self.objects
            .write()
            .await
            .insert((folder.to_string(), key.to_string()), bytes.to_vec());
        Ok(self.public_url(folder, key))
    }

    async fn exists(&self, folder: &str, key: &str) -> Result<bool, DbError> {
        Ok(self
            .objects
            .read()
            .await
            .contains_key(&(folder.to_string(), key.to_string())))
    }

    fn public_url(&self, folder: &str, key: &str) -> String {
        format!("{}/{folder}/{key}", Self::BASE_URL)
    }
}
