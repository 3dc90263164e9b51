//! Registry error types.

use thiserror::Error;
use vdet_models::JobState;

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("State conflict for job {job_id}: expected {expected}, found {actual}")]
    Conflict {
        job_id: String,
        expected: JobState,
        actual: JobState,
    },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Lease lost for job {job_id}: epoch {presented} superseded by {current}")]
    LeaseLost {
        job_id: String,
        presented: u64,
        current: u64,
    },

    #[error("Storage unavailable: {0}")]
    Storage(String),
}

impl RegistryError {
    pub fn not_found(job_id: impl Into<String>) -> Self {
        Self::NotFound(job_id.into())
    }

    pub fn conflict(job_id: impl Into<String>, expected: JobState, actual: JobState) -> Self {
        Self::Conflict {
            job_id: job_id.into(),
            expected,
            actual,
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Expected under concurrent redelivery; callers skip instead of failing.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            RegistryError::Conflict { .. }
                | RegistryError::InvalidTransition { .. }
                | RegistryError::LeaseLost { .. }
        )
    }
}
