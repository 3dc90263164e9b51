//! The inference seam the worker holds.

use async_trait::async_trait;

use vdet_media::Frame;
use vdet_models::Detection;

use crate::error::EngineResult;

/// Per-frame object detection capability.
///
/// The worker never knows which model backs this; production wires in the
/// HTTP sidecar, tests wire in fakes. An empty `Vec` is a valid outcome, not
/// an error.
#[async_trait]
pub trait DetectionEngine: Send + Sync {
    /// Run inference on one decoded frame.
    async fn detect(&self, frame: &Frame) -> EngineResult<Vec<Detection>>;

    /// Whether the engine is reachable and ready.
    async fn health_check(&self) -> bool {
        true
    }
}
