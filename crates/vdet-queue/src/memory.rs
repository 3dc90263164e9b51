//! In-memory broker for tests and single-process deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, warn};

use vdet_models::{JobId, QueueMessage};

use crate::broker::{Broker, Lease};
use crate::error::{QueueError, QueueResult};

struct LeasedEntry {
    message: QueueMessage,
    deadline: Instant,
}

#[derive(Default)]
struct State {
    ready: VecDeque<QueueMessage>,
    leased: HashMap<String, LeasedEntry>,
    dead: Vec<QueueMessage>,
    next_lease_id: u64,
}

/// Broker keeping messages in process memory.
///
/// Delivery is FIFO from the ready deque; an expired lease is moved back to
/// the ready deque with its attempt counter bumped, which is the same
/// at-least-once contract the Redis backend provides.
pub struct MemoryBroker {
    visibility_timeout: Duration,
    state: Mutex<State>,
    notify: Notify,
}

impl MemoryBroker {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            visibility_timeout,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        }
    }

    /// Messages waiting for delivery (excludes leased ones).
    pub fn len(&self) -> usize {
        self.state.lock().expect("broker lock poisoned").ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages dropped via `nack(requeue=false)`.
    pub fn dead_letter_len(&self) -> usize {
        self.state.lock().expect("broker lock poisoned").dead.len()
    }

    fn try_dequeue(&self) -> QueueResult<Option<Lease>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| QueueError::dequeue_failed("broker lock poisoned"))?;

        // Reclaim expired leases first so redelivery keeps FIFO-ish order.
        let now = Instant::now();
        let expired: Vec<String> = state
            .leased
            .iter()
            .filter(|(_, e)| e.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(entry) = state.leased.remove(&id) {
                warn!(job_id = %entry.message.job_id, "Lease expired, redelivering");
                state.ready.push_back(entry.message.redelivered());
            }
        }

        let Some(message) = state.ready.pop_front() else {
            return Ok(None);
        };

        state.next_lease_id += 1;
        let message_id = format!("mem-{}", state.next_lease_id);
        state.leased.insert(
            message_id.clone(),
            LeasedEntry {
                message: message.clone(),
                deadline: now + self.visibility_timeout,
            },
        );

        debug!(job_id = %message.job_id, message_id, "Leased message");
        Ok(Some(Lease {
            message_id,
            message,
        }))
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn enqueue(&self, job_id: &JobId) -> QueueResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| QueueError::enqueue_failed("broker lock poisoned"))?;
        state.ready.push_back(QueueMessage::new(job_id.clone()));
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> QueueResult<Option<Lease>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(lease) = self.try_dequeue()? {
                return Ok(Some(lease));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            // Wake on enqueue, but also tick so expired leases get noticed.
            let wait = (deadline - now).min(Duration::from_millis(50));
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn ack(&self, lease: &Lease) -> QueueResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| QueueError::dequeue_failed("broker lock poisoned"))?;
        if state.leased.remove(&lease.message_id).is_none() {
            // Lease already expired and redelivered; nothing left to ack.
            debug!(message_id = %lease.message_id, "Ack for expired lease ignored");
        }
        Ok(())
    }

    async fn nack(&self, lease: &Lease, requeue: bool) -> QueueResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| QueueError::dequeue_failed("broker lock poisoned"))?;
        if let Some(entry) = state.leased.remove(&lease.message_id) {
            if requeue {
                state.ready.push_back(entry.message.redelivered());
                drop(state);
                self.notify.notify_one();
            } else {
                state.dead.push(entry.message);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_dequeue_ack() {
        let broker = MemoryBroker::new(Duration::from_secs(60));
        let job_id = JobId::new();

        broker.enqueue(&job_id).await.unwrap();
        let lease = broker
            .dequeue(Duration::from_millis(100))
            .await
            .unwrap()
            .expect("message");
        assert_eq!(lease.job_id(), &job_id);
        assert_eq!(lease.message.attempt, 1);

        broker.ack(&lease).await.unwrap();
        assert!(broker
            .dequeue(Duration::from_millis(50))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_empty_dequeue_times_out() {
        let broker = MemoryBroker::new(Duration::from_secs(60));
        let got = broker.dequeue(Duration::from_millis(20)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_unacked_lease_is_redelivered_with_bumped_attempt() {
        let broker = MemoryBroker::new(Duration::from_millis(30));
        let job_id = JobId::new();
        broker.enqueue(&job_id).await.unwrap();

        let first = broker
            .dequeue(Duration::from_millis(100))
            .await
            .unwrap()
            .expect("first delivery");

        // Not visible again before the timeout elapses.
        assert!(broker
            .dequeue(Duration::from_millis(10))
            .await
            .unwrap()
            .is_none());

        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = broker
            .dequeue(Duration::from_millis(100))
            .await
            .unwrap()
            .expect("redelivery");
        assert_eq!(second.job_id(), &job_id);
        assert_eq!(second.message.attempt, first.message.attempt + 1);
    }

    #[tokio::test]
    async fn test_nack_requeue_and_dead_letter() {
        let broker = MemoryBroker::new(Duration::from_secs(60));
        let job_id = JobId::new();
        broker.enqueue(&job_id).await.unwrap();

        let lease = broker
            .dequeue(Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        broker.nack(&lease, true).await.unwrap();

        let lease = broker
            .dequeue(Duration::from_millis(100))
            .await
            .unwrap()
            .expect("requeued");
        assert_eq!(lease.message.attempt, 2);

        broker.nack(&lease, false).await.unwrap();
        assert_eq!(broker.dead_letter_len(), 1);
        assert!(broker
            .dequeue(Duration::from_millis(20))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_fifo_within_queue() {
        let broker = MemoryBroker::new(Duration::from_secs(60));
        let a = JobId::new();
        let b = JobId::new();
        broker.enqueue(&a).await.unwrap();
        broker.enqueue(&b).await.unwrap();

        let first = broker
            .dequeue(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.job_id(), &a);
    }
}
