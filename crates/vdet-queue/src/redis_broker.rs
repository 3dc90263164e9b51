//! Redis Streams broker backend.
//!
//! Messages live on a stream consumed through a consumer group. A dequeued
//! entry stays pending until XACKed; entries pending longer than the
//! visibility timeout are recovered with XAUTOCLAIM, which is how a crashed
//! worker's lease becomes redeliverable.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vdet_models::{JobId, QueueMessage};

use crate::broker::{Broker, BrokerConfig, Lease};
use crate::error::{QueueError, QueueResult};

/// Broker backed by a Redis stream.
pub struct RedisBroker {
    client: redis::Client,
    config: BrokerConfig,
    consumer_name: String,
}

impl RedisBroker {
    /// Create a new broker client.
    pub fn new(config: BrokerConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let consumer_name = format!("worker-{}", Uuid::new_v4());
        Ok(Self {
            client,
            config,
            consumer_name,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(BrokerConfig::from_env())
    }

    /// Initialize the stream (create the consumer group if missing).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Queue length (ready plus pending entries).
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Dead-letter stream length.
    pub async fn dead_letter_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    async fn add_message(&self, stream: &str, message: &QueueMessage) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(message)?;

        let message_id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg("msg")
            .arg(&payload)
            .query_async(&mut conn)
            .await?;
        Ok(message_id)
    }

    fn parse_entry(&self, entry: &redis::streams::StreamId) -> Option<QueueMessage> {
        let redis::Value::BulkString(payload) = entry.map.get("msg")? else {
            return None;
        };
        match serde_json::from_slice::<QueueMessage>(payload) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(message_id = %entry.id, "Failed to parse queue message: {}", e);
                None
            }
        }
    }

    /// Read one new entry from the consumer group.
    async fn read_new(&self, block_ms: u64) -> QueueResult<Option<Lease>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let reply: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.consumer_name)
            .arg("COUNT")
            .arg(1)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        for stream_key in reply.keys {
            for entry in stream_key.ids {
                let message_id = entry.id.clone();
                match self.parse_entry(&entry) {
                    Some(message) => {
                        debug!(job_id = %message.job_id, message_id, "Leased message");
                        return Ok(Some(Lease {
                            message_id,
                            message,
                        }));
                    }
                    None => {
                        // Malformed entry: ack it away so it cannot wedge the
                        // group.
                        self.ack_by_id(&message_id).await.ok();
                    }
                }
            }
        }

        Ok(None)
    }

    /// Recover one entry whose lease expired (pending past the visibility
    /// timeout, e.g. its worker crashed).
    async fn claim_expired(&self) -> QueueResult<Option<Lease>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let min_idle_ms = self.config.visibility_timeout.as_millis() as u64;

        let reply: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&self.consumer_name)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await?;

        for entry in reply.claimed {
            let message_id = entry.id.clone();
            match self.parse_entry(&entry) {
                Some(message) => {
                    info!(job_id = %message.job_id, message_id, "Claimed expired lease");
                    return Ok(Some(Lease {
                        message_id,
                        message: message.redelivered(),
                    }));
                }
                None => {
                    self.ack_by_id(&message_id).await.ok();
                }
            }
        }

        Ok(None)
    }

    async fn ack_by_id(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn enqueue(&self, job_id: &JobId) -> QueueResult<()> {
        let message = QueueMessage::new(job_id.clone());
        let message_id = self.add_message(&self.config.stream_name, &message).await?;
        info!(job_id = %job_id, message_id, "Enqueued job");
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> QueueResult<Option<Lease>> {
        // Expired leases first so crashed work is picked up promptly.
        if let Some(lease) = self.claim_expired().await? {
            return Ok(Some(lease));
        }

        self.read_new(timeout.as_millis() as u64).await
    }

    async fn ack(&self, lease: &Lease) -> QueueResult<()> {
        self.ack_by_id(&lease.message_id).await?;
        debug!(message_id = %lease.message_id, "Acknowledged message");
        Ok(())
    }

    async fn nack(&self, lease: &Lease, requeue: bool) -> QueueResult<()> {
        if requeue {
            self.add_message(&self.config.stream_name, &lease.message.redelivered())
                .await?;
        } else {
            self.add_message(&self.config.dlq_stream_name, &lease.message)
                .await?;
            warn!(job_id = %lease.job_id(), "Moved message to dead-letter stream");
        }
        self.ack_by_id(&lease.message_id).await
    }
}
