//! Asset store contract.

use async_trait::async_trait;

use vdet_models::AssetId;

use crate::error::StorageResult;

/// Key/blob contract for video assets and result blobs.
///
/// Assets are addressed by opaque uuid-based ids and are immutable once
/// written: writing the same id twice is an error, superseding content means
/// storing a new asset. Backends surface all failures as `StorageError`,
/// which the worker treats as transient.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store bytes under a fresh asset id and return the id.
    async fn store(&self, bytes: Vec<u8>) -> StorageResult<AssetId> {
        let id = AssetId::new();
        self.store_with_id(&id, bytes).await?;
        Ok(id)
    }

    /// Store bytes under a caller-chosen id. Fails if the id already exists.
    async fn store_with_id(&self, id: &AssetId, bytes: Vec<u8>) -> StorageResult<()>;

    /// Load the bytes of an asset.
    async fn load(&self, id: &AssetId) -> StorageResult<Vec<u8>>;

    /// Check whether an asset exists.
    async fn exists(&self, id: &AssetId) -> StorageResult<bool>;
}
