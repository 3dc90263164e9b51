//! Video asset store.
//!
//! This crate provides:
//! - The `AssetStore` key/blob contract (uuid-addressed, immutable post-write)
//! - A filesystem backend and an in-memory backend
//! - Detection-result persistence as gzip-compressed JSON blobs

pub mod error;
pub mod fs;
pub mod memory;
pub mod results;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use fs::FsAssetStore;
pub use memory::MemoryAssetStore;
pub use results::{load_detection_result, store_detection_result};
pub use store::AssetStore;
