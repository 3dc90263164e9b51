//! Detection result persistence (gzip-compressed JSON blobs).
//!
//! Results are stored through the same `AssetStore` as video bytes; the
//! returned reference is the opaque blob id recorded on the job.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use vdet_models::{AssetId, DetectionResult};

use crate::error::{StorageError, StorageResult};
use crate::store::AssetStore;

/// Serialize and gzip a detection result.
pub fn compress_detection_result(result: &DetectionResult) -> StorageResult<Vec<u8>> {
    let json = serde_json::to_vec(result)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Gunzip and deserialize a detection result.
pub fn decompress_detection_result(bytes: &[u8]) -> StorageResult<DetectionResult> {
    let mut decoder = GzDecoder::new(bytes);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Persist a detection result and return its reference.
pub async fn store_detection_result(
    store: &dyn AssetStore,
    result: &DetectionResult,
) -> StorageResult<String> {
    let compressed = compress_detection_result(result)?;
    let id = store.store(compressed).await?;
    debug!(
        result_ref = %id,
        frames = result.frame_count(),
        detections = result.total_detections(),
        "Stored detection result"
    );
    Ok(id.as_str().to_string())
}

/// Load a detection result by the reference recorded on a job.
pub async fn load_detection_result(
    store: &dyn AssetStore,
    result_ref: &str,
) -> StorageResult<DetectionResult> {
    if result_ref.is_empty() {
        return Err(StorageError::invalid_key("empty result_ref"));
    }
    let bytes = store.load(&AssetId::from_string(result_ref)).await?;
    decompress_detection_result(&bytes)
}
