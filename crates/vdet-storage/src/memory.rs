//! In-memory asset store for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use vdet_models::AssetId;

use crate::error::{StorageError, StorageResult};
use crate::store::AssetStore;

/// Asset store keeping all blobs in process memory.
#[derive(Default)]
pub struct MemoryAssetStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored assets.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn store_with_id(&self, id: &AssetId, bytes: Vec<u8>) -> StorageResult<()> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| StorageError::write_failed("store lock poisoned"))?;
        if blobs.contains_key(id.as_str()) {
            return Err(StorageError::already_exists(id.as_str()));
        }
        blobs.insert(id.as_str().to_string(), bytes);
        Ok(())
    }

    async fn load(&self, id: &AssetId) -> StorageResult<Vec<u8>> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| StorageError::read_failed("store lock poisoned"))?;
        blobs
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| StorageError::not_found(id.as_str()))
    }

    async fn exists(&self, id: &AssetId) -> StorageResult<bool> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| StorageError::read_failed("store lock poisoned"))?;
        Ok(blobs.contains_key(id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryAssetStore::new();
        let id = store.store(vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_immutable() {
        let store = MemoryAssetStore::new();
        let id = store.store(vec![1]).await.unwrap();
        assert!(store.store_with_id(&id, vec![2]).await.is_err());
    }
}
