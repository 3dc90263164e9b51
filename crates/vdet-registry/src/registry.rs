//! Job registry contract.

use std::time::Duration;

use async_trait::async_trait;

use vdet_models::{AssetId, Job, JobError, JobId, JobState};

use crate::error::RegistryResult;

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Retry ceiling: retries permitted after the initial attempt.
    ///
    /// A job whose retriable failures exceed this goes to Failed with
    /// `attempt_count == max_retries + 1`.
    pub max_retries: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl RegistryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_retries: std::env::var("JOB_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        }
    }
}

/// Outcome of recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Retriable and attempts remain; the job is back in Queued and the
    /// caller must re-enqueue it on the broker.
    Requeued,
    /// Non-retriable, or the retry ceiling is exhausted; the job is Failed
    /// with the error descriptor attached.
    Failed,
}

/// Whether an edge exists in the job state machine.
///
/// `Queued -> Processing -> {Done | Queued | Failed}`, plus
/// `Queued -> Cancelled`. Nothing leaves a terminal state.
pub fn valid_transition(from: JobState, to: JobState) -> bool {
    use JobState::*;
    matches!(
        (from, to),
        (Queued, Processing) | (Queued, Cancelled) | (Processing, Done) | (Processing, Queued) | (Processing, Failed)
    )
}

/// The authoritative record of job identity and state.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Allocate a new job in state Queued with attempt_count 0.
    async fn create(&self, video_asset_id: AssetId) -> RegistryResult<Job>;

    /// Fetch a job by id.
    async fn get(&self, job_id: &JobId) -> RegistryResult<Job>;

    /// Atomic compare-and-set on state.
    ///
    /// Rejects with `Conflict` when the current state differs from
    /// `expected`, and with `InvalidTransition` for edges outside the state
    /// machine. This is what makes duplicate delivery safe.
    async fn transition(
        &self,
        job_id: &JobId,
        expected: JobState,
        new: JobState,
    ) -> RegistryResult<Job>;

    /// Progress write-back from the owning worker.
    ///
    /// `lease_epoch` is the value on the job returned by the claiming
    /// `transition`. Only valid while the job is Processing under that same
    /// epoch; a Conflict or LeaseLost here tells the worker its lease was
    /// reclaimed (even if another worker has since re-claimed the job).
    async fn update_progress(
        &self,
        job_id: &JobId,
        lease_epoch: u64,
        total_frames: u64,
        processed_frames: u64,
        detections_count: u64,
    ) -> RegistryResult<()>;

    /// Record a failed attempt.
    ///
    /// Increments `attempt_count`. A retriable failure below the ceiling
    /// transitions back to Queued; anything else transitions to Failed with
    /// the error descriptor attached.
    async fn record_failure(
        &self,
        job_id: &JobId,
        error: JobError,
        retriable: bool,
    ) -> RegistryResult<FailureOutcome>;

    /// Record success, attaching the output references.
    ///
    /// Idempotent when the job is already Done with identical references
    /// (a duplicate completion from a retried worker is tolerated, never
    /// double-applied).
    async fn record_success(
        &self,
        job_id: &JobId,
        output_asset_id: Option<AssetId>,
        result_ref: Option<String>,
    ) -> RegistryResult<Job>;

    /// Cancel a job that has not been claimed yet (Queued -> Cancelled).
    async fn cancel(&self, job_id: &JobId) -> RegistryResult<Job>;

    /// Force Processing jobs whose `updated_at` is older than the timeout
    /// back to Queued, returning the reclaimed ids for re-enqueue.
    async fn reclaim_stale(&self, older_than: Duration) -> RegistryResult<Vec<JobId>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_edges() {
        use JobState::*;
        assert!(valid_transition(Queued, Processing));
        assert!(valid_transition(Queued, Cancelled));
        assert!(valid_transition(Processing, Done));
        assert!(valid_transition(Processing, Queued));
        assert!(valid_transition(Processing, Failed));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        use JobState::*;
        for from in [Done, Failed, Cancelled] {
            for to in [Queued, Processing, Done, Failed, Cancelled] {
                assert!(!valid_transition(from, to), "{from} -> {to} must be invalid");
            }
        }
    }

    #[test]
    fn test_no_direct_queued_to_done() {
        assert!(!valid_transition(JobState::Queued, JobState::Done));
        assert!(!valid_transition(JobState::Queued, JobState::Failed));
    }
}
