//! Filesystem-backed asset store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use vdet_models::AssetId;

use crate::error::{StorageError, StorageResult};
use crate::store::AssetStore;

/// Asset store writing one file per asset under a root directory.
///
/// Keys are validated before touching the filesystem so an id can never
/// escape the root.
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    /// Create a store rooted at the given directory, creating it if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, id: &AssetId) -> StorageResult<PathBuf> {
        let key = id.as_str();
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(StorageError::invalid_key(key));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn store_with_id(&self, id: &AssetId, bytes: Vec<u8>) -> StorageResult<()> {
        let path = self.path_for(id)?;
        if tokio::fs::try_exists(&path).await? {
            return Err(StorageError::already_exists(id.as_str()));
        }

        // Write to a temp name first so a crashed write never leaves a
        // partial asset under its final id.
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(asset_id = %id, size = bytes.len(), "Stored asset");
        Ok(())
    }

    async fn load(&self, id: &AssetId) -> StorageResult<Vec<u8>> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(id.as_str()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, id: &AssetId) -> StorageResult<bool> {
        let path = self.path_for(id)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path()).await.unwrap();

        let id = store.store(b"hello video".to_vec()).await.unwrap();
        assert!(store.exists(&id).await.unwrap());
        assert_eq!(store.load(&id).await.unwrap(), b"hello video");
    }

    #[tokio::test]
    async fn test_overwrite_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path()).await.unwrap();

        let id = store.store(b"first".to_vec()).await.unwrap();
        let err = store.store_with_id(&id, b"second".to_vec()).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert_eq!(store.load(&id).await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_missing_asset_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path()).await.unwrap();

        let err = store.load(&AssetId::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsAssetStore::new(dir.path()).await.unwrap();

        let evil = AssetId::from_string("../outside");
        let err = store.load(&evil).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
