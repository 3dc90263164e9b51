//! In-memory registry implementation.
//!
//! All mutation happens under one write lock, which gives the
//! compare-and-set its atomicity. The `JobRegistry` trait is the seam for a
//! database-backed implementation with the same semantics.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use vdet_models::{AssetId, Job, JobError, JobId, JobState};

use crate::error::{RegistryError, RegistryResult};
use crate::registry::{valid_transition, FailureOutcome, JobRegistry, RegistryConfig};

/// Registry keeping job records in process memory.
pub struct MemoryRegistry {
    config: RegistryConfig,
    jobs: RwLock<HashMap<String, Job>>,
}

impl MemoryRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Retry ceiling from config.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    fn with_job_mut<T>(
        &self,
        job_id: &JobId,
        f: impl FnOnce(&mut Job) -> RegistryResult<T>,
    ) -> RegistryResult<T> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| RegistryError::storage("registry lock poisoned"))?;
        let job = jobs
            .get_mut(job_id.as_str())
            .ok_or_else(|| RegistryError::not_found(job_id.as_str()))?;
        f(job)
    }
}

#[async_trait]
impl JobRegistry for MemoryRegistry {
    async fn create(&self, video_asset_id: AssetId) -> RegistryResult<Job> {
        let job = Job::new(video_asset_id);
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| RegistryError::storage("registry lock poisoned"))?;
        jobs.insert(job.id.as_str().to_string(), job.clone());
        debug!(job_id = %job.id, "Created job");
        Ok(job)
    }

    async fn get(&self, job_id: &JobId) -> RegistryResult<Job> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| RegistryError::storage("registry lock poisoned"))?;
        jobs.get(job_id.as_str())
            .cloned()
            .ok_or_else(|| RegistryError::not_found(job_id.as_str()))
    }

    async fn transition(
        &self,
        job_id: &JobId,
        expected: JobState,
        new: JobState,
    ) -> RegistryResult<Job> {
        self.with_job_mut(job_id, |job| {
            if job.state != expected {
                return Err(RegistryError::conflict(job_id.as_str(), expected, job.state));
            }
            if !valid_transition(expected, new) {
                return Err(RegistryError::InvalidTransition {
                    from: expected,
                    to: new,
                });
            }
            job.state = new;
            if new == JobState::Processing {
                job.lease_epoch += 1;
            }
            job.updated_at = Utc::now();
            debug!(job_id = %job_id, from = %expected, to = %new, "Job transition");
            Ok(job.clone())
        })
    }

    async fn update_progress(
        &self,
        job_id: &JobId,
        lease_epoch: u64,
        total_frames: u64,
        processed_frames: u64,
        detections_count: u64,
    ) -> RegistryResult<()> {
        self.with_job_mut(job_id, |job| {
            if job.state != JobState::Processing {
                return Err(RegistryError::conflict(
                    job_id.as_str(),
                    JobState::Processing,
                    job.state,
                ));
            }
            // A reclaimed-then-reclaimed job is Processing again under a
            // newer epoch; the slow original worker must not touch it.
            if lease_epoch != job.lease_epoch {
                return Err(RegistryError::LeaseLost {
                    job_id: job_id.as_str().to_string(),
                    presented: lease_epoch,
                    current: job.lease_epoch,
                });
            }
            job.total_frames = total_frames;
            job.processed_frames = processed_frames;
            job.detections_count = detections_count;
            job.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn record_failure(
        &self,
        job_id: &JobId,
        error: JobError,
        retriable: bool,
    ) -> RegistryResult<FailureOutcome> {
        let max_retries = self.config.max_retries;
        self.with_job_mut(job_id, |job| {
            if job.state != JobState::Processing {
                return Err(RegistryError::conflict(
                    job_id.as_str(),
                    JobState::Processing,
                    job.state,
                ));
            }

            job.attempt_count += 1;
            job.updated_at = Utc::now();

            let attempts_remain = job.attempt_count <= max_retries;
            if retriable && attempts_remain {
                job.state = JobState::Queued;
                info!(
                    job_id = %job_id,
                    attempt = job.attempt_count,
                    max_retries,
                    error = %error,
                    "Job failed, requeueing"
                );
                Ok(FailureOutcome::Requeued)
            } else {
                job.state = JobState::Failed;
                job.error = Some(error.clone());
                warn!(
                    job_id = %job_id,
                    attempt = job.attempt_count,
                    retriable,
                    error = %error,
                    "Job failed permanently"
                );
                Ok(FailureOutcome::Failed)
            }
        })
    }

    async fn record_success(
        &self,
        job_id: &JobId,
        output_asset_id: Option<AssetId>,
        result_ref: Option<String>,
    ) -> RegistryResult<Job> {
        self.with_job_mut(job_id, |job| {
            if job.state == JobState::Done {
                // Duplicate completion from a retried worker.
                if job.output_asset_id == output_asset_id && job.result_ref == result_ref {
                    return Ok(job.clone());
                }
                return Err(RegistryError::conflict(
                    job_id.as_str(),
                    JobState::Processing,
                    job.state,
                ));
            }
            if job.state != JobState::Processing {
                return Err(RegistryError::conflict(
                    job_id.as_str(),
                    JobState::Processing,
                    job.state,
                ));
            }

            job.state = JobState::Done;
            job.output_asset_id = output_asset_id;
            job.result_ref = result_ref;
            job.updated_at = Utc::now();
            info!(job_id = %job_id, attempts = job.attempt_count + 1, "Job completed");
            Ok(job.clone())
        })
    }

    async fn cancel(&self, job_id: &JobId) -> RegistryResult<Job> {
        let job = self.transition(job_id, JobState::Queued, JobState::Cancelled).await?;
        info!(job_id = %job_id, "Job cancelled");
        Ok(job)
    }

    async fn reclaim_stale(&self, older_than: Duration) -> RegistryResult<Vec<JobId>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| RegistryError::storage(e.to_string()))?;

        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| RegistryError::storage("registry lock poisoned"))?;

        let mut reclaimed = Vec::new();
        for job in jobs.values_mut() {
            if job.state == JobState::Processing && job.updated_at <= cutoff {
                job.state = JobState::Queued;
                job.updated_at = Utc::now();
                warn!(job_id = %job.id, "Reclaimed stale job");
                reclaimed.push(job.id.clone());
            }
        }
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdet_models::FailureKind;

    fn registry(max_retries: u32) -> MemoryRegistry {
        MemoryRegistry::new(RegistryConfig { max_retries })
    }

    fn transient_error() -> JobError {
        JobError::new(FailureKind::TransientInfra, "engine timed out")
    }

    #[tokio::test]
    async fn test_create_then_get_is_queued() {
        let reg = registry(3);
        let job = reg.create(AssetId::new()).await.unwrap();
        let fetched = reg.get(&job.id).await.unwrap();
        assert_eq!(fetched.state, JobState::Queued);
        assert_eq!(fetched.attempt_count, 0);
    }

    #[tokio::test]
    async fn test_cas_rejects_second_claim() {
        let reg = registry(3);
        let job = reg.create(AssetId::new()).await.unwrap();

        reg.transition(&job.id, JobState::Queued, JobState::Processing)
            .await
            .unwrap();
        let err = reg
            .transition(&job.id, JobState::Queued, JobState::Processing)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_retriable_failure_requeues_until_ceiling() {
        let reg = registry(2);
        let job = reg.create(AssetId::new()).await.unwrap();

        for expected_attempt in 1..=2u32 {
            reg.transition(&job.id, JobState::Queued, JobState::Processing)
                .await
                .unwrap();
            let outcome = reg
                .record_failure(&job.id, transient_error(), true)
                .await
                .unwrap();
            assert_eq!(outcome, FailureOutcome::Requeued);
            let j = reg.get(&job.id).await.unwrap();
            assert_eq!(j.state, JobState::Queued);
            assert_eq!(j.attempt_count, expected_attempt);
        }

        // Third attempt exhausts the ceiling.
        reg.transition(&job.id, JobState::Queued, JobState::Processing)
            .await
            .unwrap();
        let outcome = reg
            .record_failure(&job.id, transient_error(), true)
            .await
            .unwrap();
        assert_eq!(outcome, FailureOutcome::Failed);

        let j = reg.get(&job.id).await.unwrap();
        assert_eq!(j.state, JobState::Failed);
        assert_eq!(j.attempt_count, 3);
        assert_eq!(j.error.as_ref().unwrap().kind, FailureKind::TransientInfra);
    }

    #[tokio::test]
    async fn test_non_retriable_failure_is_immediately_final() {
        let reg = registry(5);
        let job = reg.create(AssetId::new()).await.unwrap();

        reg.transition(&job.id, JobState::Queued, JobState::Processing)
            .await
            .unwrap();
        let outcome = reg
            .record_failure(
                &job.id,
                JobError::new(FailureKind::Validation, "unsupported codec"),
                false,
            )
            .await
            .unwrap();
        assert_eq!(outcome, FailureOutcome::Failed);
        assert_eq!(reg.get(&job.id).await.unwrap().attempt_count, 1);
    }

    #[tokio::test]
    async fn test_record_success_is_idempotent_for_identical_refs() {
        let reg = registry(3);
        let job = reg.create(AssetId::new()).await.unwrap();
        let output = AssetId::new();

        reg.transition(&job.id, JobState::Queued, JobState::Processing)
            .await
            .unwrap();
        reg.record_success(&job.id, Some(output.clone()), Some("ref-1".into()))
            .await
            .unwrap();

        // Same references again: tolerated.
        let again = reg
            .record_success(&job.id, Some(output), Some("ref-1".into()))
            .await
            .unwrap();
        assert_eq!(again.state, JobState::Done);

        // Different references: conflict.
        let err = reg
            .record_success(&job.id, Some(AssetId::new()), Some("ref-2".into()))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let reg = registry(3);
        let job = reg.create(AssetId::new()).await.unwrap();

        reg.transition(&job.id, JobState::Queued, JobState::Processing)
            .await
            .unwrap();
        reg.record_success(&job.id, None, None).await.unwrap();

        let err = reg
            .transition(&job.id, JobState::Done, JobState::Queued)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_cancel_only_from_queued() {
        let reg = registry(3);
        let job = reg.create(AssetId::new()).await.unwrap();
        let cancelled = reg.cancel(&job.id).await.unwrap();
        assert_eq!(cancelled.state, JobState::Cancelled);

        let other = reg.create(AssetId::new()).await.unwrap();
        reg.transition(&other.id, JobState::Queued, JobState::Processing)
            .await
            .unwrap();
        assert!(reg.cancel(&other.id).await.is_err());
    }

    #[tokio::test]
    async fn test_reclaim_stale_requeues_processing_jobs() {
        let reg = registry(3);
        let job = reg.create(AssetId::new()).await.unwrap();
        reg.transition(&job.id, JobState::Queued, JobState::Processing)
            .await
            .unwrap();

        // Zero timeout: everything Processing is stale.
        let reclaimed = reg.reclaim_stale(Duration::from_secs(0)).await.unwrap();
        assert_eq!(reclaimed, vec![job.id.clone()]);
        assert_eq!(reg.get(&job.id).await.unwrap().state, JobState::Queued);

        // A fresh Processing job is left alone with a generous timeout.
        reg.transition(&job.id, JobState::Queued, JobState::Processing)
            .await
            .unwrap();
        let reclaimed = reg.reclaim_stale(Duration::from_secs(3600)).await.unwrap();
        assert!(reclaimed.is_empty());
    }

    #[tokio::test]
    async fn test_progress_updates_require_ownership() {
        let reg = registry(3);
        let job = reg.create(AssetId::new()).await.unwrap();

        assert!(reg.update_progress(&job.id, 1, 100, 10, 3).await.is_err());

        let claimed = reg
            .transition(&job.id, JobState::Queued, JobState::Processing)
            .await
            .unwrap();
        reg.update_progress(&job.id, claimed.lease_epoch, 100, 10, 3)
            .await
            .unwrap();

        let j = reg.get(&job.id).await.unwrap();
        assert_eq!(j.total_frames, 100);
        assert_eq!(j.processed_frames, 10);
        assert_eq!(j.detections_count, 3);
    }

    #[tokio::test]
    async fn test_progress_from_superseded_lease_is_rejected() {
        let reg = registry(3);
        let job = reg.create(AssetId::new()).await.unwrap();

        // First worker claims, then stalls long enough to be reclaimed.
        let first = reg
            .transition(&job.id, JobState::Queued, JobState::Processing)
            .await
            .unwrap();
        reg.reclaim_stale(Duration::from_secs(0)).await.unwrap();

        // A second worker claims the same job under a newer epoch.
        let second = reg
            .transition(&job.id, JobState::Queued, JobState::Processing)
            .await
            .unwrap();
        assert!(second.lease_epoch > first.lease_epoch);

        // The stalled worker's write is rejected even though the job is
        // Processing again.
        let err = reg
            .update_progress(&job.id, first.lease_epoch, 100, 50, 7)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::LeaseLost { .. }));
        assert!(err.is_conflict());

        let j = reg.get(&job.id).await.unwrap();
        assert_eq!(j.processed_frames, 0);

        reg.update_progress(&job.id, second.lease_epoch, 100, 50, 7)
            .await
            .unwrap();
        assert_eq!(reg.get(&job.id).await.unwrap().processed_frames, 50);
    }
}
