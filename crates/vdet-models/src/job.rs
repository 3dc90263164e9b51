//! Job record and state machine types.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::AssetId;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state.
///
/// The registry's compare-and-set transition is the only way a job moves
/// between states; terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in the queue (initial state, and the retry state)
    #[default]
    Queued,
    /// Job is owned by exactly one worker
    Processing,
    /// Job completed successfully
    Done,
    /// Job failed permanently (retries exhausted or non-retriable error)
    Failed,
    /// Job was cancelled before a worker claimed it
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no further transitions permitted).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Malformed or unsupported input video (never retried)
    Validation,
    /// Broker/storage/engine timeout or unavailability (retried up to the ceiling)
    TransientInfra,
    /// Detection model invocation failure (retried up to the ceiling)
    Engine,
    /// Anything else
    Internal,
}

/// Error descriptor attached to a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable message from the last observed error
    pub message: String,
}

impl JobError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// A video analysis job.
///
/// The registry owns every mutation of this record; workers only observe it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Input video asset
    pub video_asset_id: AssetId,

    /// Current state
    #[serde(default)]
    pub state: JobState,

    /// Number of completed processing attempts
    #[serde(default)]
    pub attempt_count: u32,

    /// Bumped on every Queued -> Processing claim. Progress writes must
    /// carry the epoch observed at claim time, so a worker whose lease was
    /// reclaimed cannot write into a later attempt.
    #[serde(default)]
    pub lease_epoch: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last state-transition timestamp
    pub updated_at: DateTime<Utc>,

    /// Annotated output asset (set on success, when annotation is enabled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_asset_id: Option<AssetId>,

    /// Reference to the persisted detection result collection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,

    /// Error descriptor (set when state is Failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Total frames in the input (populated once the video is probed)
    #[serde(default)]
    pub total_frames: u64,

    /// Frames processed so far (progress write-back)
    #[serde(default)]
    pub processed_frames: u64,

    /// Running total of detections across processed frames
    #[serde(default)]
    pub detections_count: u64,
}

impl Job {
    /// Create a new job in the Queued state.
    pub fn new(video_asset_id: AssetId) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            video_asset_id,
            state: JobState::Queued,
            attempt_count: 0,
            lease_epoch: 0,
            created_at: now,
            updated_at: now,
            output_asset_id: None,
            result_ref: None,
            error: None,
            total_frames: 0,
            processed_frames: 0,
            detections_count: 0,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Progress percentage (0-100) derived from the frame counters.
    pub fn progress_percentage(&self) -> u8 {
        if self.total_frames == 0 {
            return 0;
        }
        ((self.processed_frames * 100 / self.total_frames) as u8).min(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_queued() {
        let job = Job::new(AssetId::new());
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempt_count, 0);
        assert!(!job.is_terminal());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Processing.is_terminal());
    }

    #[test]
    fn test_progress_percentage() {
        let mut job = Job::new(AssetId::new());
        assert_eq!(job.progress_percentage(), 0);

        job.total_frames = 200;
        job.processed_frames = 50;
        assert_eq!(job.progress_percentage(), 25);

        job.processed_frames = 200;
        assert_eq!(job.progress_percentage(), 100);
    }

    #[test]
    fn test_state_serde_snake_case() {
        let json = serde_json::to_string(&JobState::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        let state: JobState = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(state, JobState::Cancelled);
    }
}
