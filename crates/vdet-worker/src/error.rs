//! Worker error types and failure classification.

use thiserror::Error;

use vdet_engine::EngineError;
use vdet_media::MediaError;
use vdet_models::{DetectionResultError, FailureKind, JobError};
use vdet_queue::QueueError;
use vdet_registry::RegistryError;
use vdet_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Result ordering violated: {0}")]
    ResultOrder(#[from] DetectionResultError),

    #[error("Job timed out after {0} seconds")]
    JobTimeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether another attempt against healthy infrastructure could succeed.
    ///
    /// Input faults and logic errors are deterministic and never retried;
    /// everything touching the broker, store or engine is presumed
    /// transient.
    pub fn is_retriable(&self) -> bool {
        match self {
            WorkerError::Storage(_) | WorkerError::Queue(_) | WorkerError::Io(_) => true,
            WorkerError::Engine(_) => true,
            WorkerError::JobTimeout(_) => true,
            WorkerError::Media(e) => !e.is_input_fault(),
            WorkerError::Registry(_) | WorkerError::ResultOrder(_) | WorkerError::Internal(_) => {
                false
            }
        }
    }

    /// Whether this error means the job was taken away from us (lease
    /// reclaimed or job cancelled underneath the worker). The attempt is
    /// abandoned without recording a failure.
    pub fn is_lost_lease(&self) -> bool {
        matches!(self, WorkerError::Registry(e) if e.is_conflict())
    }

    fn failure_kind(&self) -> FailureKind {
        match self {
            WorkerError::Media(e) if e.is_input_fault() => FailureKind::Validation,
            WorkerError::Media(_) => FailureKind::TransientInfra,
            WorkerError::Storage(_)
            | WorkerError::Queue(_)
            | WorkerError::Io(_)
            | WorkerError::JobTimeout(_) => FailureKind::TransientInfra,
            WorkerError::Engine(_) => FailureKind::Engine,
            WorkerError::Registry(_) | WorkerError::ResultOrder(_) | WorkerError::Internal(_) => {
                FailureKind::Internal
            }
        }
    }

    /// The descriptor recorded on the job when this attempt fails.
    pub fn to_job_error(&self) -> JobError {
        JobError::new(self.failure_kind(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_faults_are_not_retried() {
        let err = WorkerError::Media(MediaError::InvalidVideo("no video stream".into()));
        assert!(!err.is_retriable());
        assert_eq!(err.to_job_error().kind, FailureKind::Validation);
    }

    #[test]
    fn test_engine_failures_are_retried() {
        let err = WorkerError::Engine(EngineError::Unavailable("503".into()));
        assert!(err.is_retriable());
        assert_eq!(err.to_job_error().kind, FailureKind::Engine);
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = WorkerError::JobTimeout(600);
        assert!(err.is_retriable());
        assert_eq!(err.to_job_error().kind, FailureKind::TransientInfra);
    }

    #[test]
    fn test_registry_conflict_is_lost_lease() {
        use vdet_models::JobState;
        let err = WorkerError::Registry(RegistryError::conflict(
            "j1",
            JobState::Processing,
            JobState::Queued,
        ));
        assert!(err.is_lost_lease());
        assert!(!err.is_retriable());
    }
}
