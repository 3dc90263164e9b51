//! Queue message wire shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// The message placed on the broker.
///
/// Messages reference jobs by id only; the registry remains the single
/// source of truth for job state and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Referenced job
    pub job_id: JobId,
    /// When the message was enqueued
    pub enqueued_at: DateTime<Utc>,
    /// Delivery attempt counter (1 on first delivery)
    pub attempt: u32,
}

impl QueueMessage {
    /// Create a first-delivery message for a job.
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            enqueued_at: Utc::now(),
            attempt: 1,
        }
    }

    /// Copy of this message with the attempt counter bumped, for redelivery.
    pub fn redelivered(&self) -> Self {
        Self {
            job_id: self.job_id.clone(),
            enqueued_at: self.enqueued_at,
            attempt: self.attempt + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serde_roundtrip() {
        let msg = QueueMessage::new(JobId::new());
        let json = serde_json::to_string(&msg).unwrap();
        let decoded: QueueMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_redelivery_bumps_attempt() {
        let msg = QueueMessage::new(JobId::new());
        assert_eq!(msg.attempt, 1);
        let again = msg.redelivered();
        assert_eq!(again.attempt, 2);
        assert_eq!(again.job_id, msg.job_id);
    }
}
