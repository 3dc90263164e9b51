//! Broker contract.

use std::time::Duration;

use async_trait::async_trait;

use vdet_models::{JobId, QueueMessage};

use crate::error::QueueResult;

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Redis URL (Redis backend only)
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter stream name
    pub dlq_stream_name: String,
    /// Lease visibility timeout: an unacked message becomes redeliverable
    /// after this long
    pub visibility_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "vdet:jobs".to_string(),
            consumer_group: "vdet:workers".to_string(),
            dlq_stream_name: "vdet:dlq".to_string(),
            visibility_timeout: Duration::from_secs(600),
        }
    }
}

impl BrokerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM")
                .unwrap_or_else(|_| "vdet:jobs".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "vdet:workers".to_string()),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM")
                .unwrap_or_else(|_| "vdet:dlq".to_string()),
            visibility_timeout: Duration::from_secs(
                std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

/// A dequeued message held under a lease.
#[derive(Debug, Clone)]
pub struct Lease {
    /// Broker-assigned message id, used to ack or nack
    pub message_id: String,
    /// The wire message (job id, enqueue time, delivery attempt)
    pub message: QueueMessage,
}

impl Lease {
    pub fn job_id(&self) -> &JobId {
        &self.message.job_id
    }
}

/// At-least-once delivery channel of job references.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Enqueue a job reference for first delivery.
    async fn enqueue(&self, job_id: &JobId) -> QueueResult<()>;

    /// Dequeue one message, blocking up to `timeout`. `None` when the queue
    /// stayed empty.
    async fn dequeue(&self, timeout: Duration) -> QueueResult<Option<Lease>>;

    /// Acknowledge a lease, removing the message permanently.
    async fn ack(&self, lease: &Lease) -> QueueResult<()>;

    /// Give up a lease: requeue for redelivery, or drop to the dead-letter
    /// stream.
    async fn nack(&self, lease: &Lease, requeue: bool) -> QueueResult<()>;
}
