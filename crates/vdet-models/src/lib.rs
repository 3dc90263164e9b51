//! Shared data models for the videodetect pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs and the job state machine
//! - Video assets and probed metadata
//! - Per-frame detections and the aggregated detection result
//! - The queue message wire shape

pub mod asset;
pub mod detection;
pub mod job;
pub mod message;

// Re-export common types
pub use asset::{AssetId, VideoMetadata};
pub use detection::{
    BoundingBox, Detection, DetectionResult, DetectionResultError, FrameDetections,
};
pub use job::{FailureKind, Job, JobError, JobId, JobState};
pub use message::QueueMessage;
