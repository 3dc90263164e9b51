//! Worker pool pulling leases from the broker.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use vdet_models::JobState;
use vdet_queue::{Broker, Lease};
use vdet_registry::{FailureOutcome, JobRegistry};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::processor::ProcessingContext;

/// Runs N worker loops against one broker and registry.
///
/// Each loop dequeues a lease, claims the job through the registry's
/// compare-and-set, runs one processing attempt, records the outcome and
/// always acks the lease. Redeliveries that lose the claim race are acked
/// and skipped.
pub struct JobExecutor {
    config: WorkerConfig,
    broker: Arc<dyn Broker>,
    registry: Arc<dyn JobRegistry>,
    ctx: Arc<ProcessingContext>,
    shutdown_tx: watch::Sender<bool>,
}

impl JobExecutor {
    pub fn new(
        config: WorkerConfig,
        broker: Arc<dyn Broker>,
        registry: Arc<dyn JobRegistry>,
        ctx: Arc<ProcessingContext>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            broker,
            registry,
            ctx,
            shutdown_tx,
        }
    }

    /// Signal all worker loops to stop after their current job.
    pub fn shutdown(&self) {
        self.shutdown_tx.send(true).ok();
    }

    /// Run the pool until shutdown.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(workers = self.config.workers, "Starting worker pool");

        let mut handles = Vec::with_capacity(self.config.workers);
        for worker_index in 0..self.config.workers {
            let config = self.config.clone();
            let broker = Arc::clone(&self.broker);
            let registry = Arc::clone(&self.registry);
            let ctx = Arc::clone(&self.ctx);
            let shutdown_rx = self.shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                worker_loop(worker_index, config, broker, registry, ctx, shutdown_rx).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker loop panicked: {}", e);
            }
        }

        info!("Worker pool stopped");
        Ok(())
    }
}

async fn worker_loop(
    worker_index: usize,
    config: WorkerConfig,
    broker: Arc<dyn Broker>,
    registry: Arc<dyn JobRegistry>,
    ctx: Arc<ProcessingContext>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(worker = worker_index, "Worker loop started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let lease = tokio::select! {
            _ = shutdown_rx.changed() => break,
            result = broker.dequeue(config.dequeue_timeout) => match result {
                Ok(Some(lease)) => lease,
                Ok(None) => continue,
                Err(e) => {
                    warn!(worker = worker_index, "Dequeue failed: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            },
        };

        handle_lease(&config, broker.as_ref(), registry.as_ref(), &ctx, &lease).await;
    }

    debug!(worker = worker_index, "Worker loop stopped");
}

/// Process one lease end to end. The lease is always acked: retries go
/// through a fresh enqueue, not broker redelivery.
async fn handle_lease(
    config: &WorkerConfig,
    broker: &dyn Broker,
    registry: &dyn JobRegistry,
    ctx: &ProcessingContext,
    lease: &Lease,
) {
    let job_id = lease.job_id().clone();
    debug!(
        job_id = %job_id,
        delivery_attempt = lease.message.attempt,
        "Dequeued job"
    );

    // Claim. Losing this race (duplicate delivery, cancellation, a sweeper
    // beaten to the punch) is normal operation.
    let job = match registry
        .transition(&job_id, JobState::Queued, JobState::Processing)
        .await
    {
        Ok(job) => job,
        Err(e) if e.is_conflict() => {
            debug!(job_id = %job_id, "Claim lost, skipping: {}", e);
            counter!("vdet_jobs_skipped_total").increment(1);
            ack(broker, lease).await;
            return;
        }
        Err(e) => {
            warn!(job_id = %job_id, "Claim failed: {}", e);
            ack(broker, lease).await;
            return;
        }
    };

    info!(job_id = %job_id, attempt = job.attempt_count + 1, "Claimed job");

    let outcome = match tokio::time::timeout(config.job_timeout, ctx.process_job(&job, config)).await
    {
        Ok(result) => result,
        Err(_) => Err(WorkerError::JobTimeout(config.job_timeout.as_secs())),
    };

    match outcome {
        Ok(output) => {
            match registry
                .record_success(&job_id, output.output_asset_id, Some(output.result_ref))
                .await
            {
                Ok(_) => {
                    info!(
                        job_id = %job_id,
                        frames = output.processed_frames,
                        detections = output.detections_count,
                        "Job done"
                    );
                    counter!("vdet_jobs_completed_total").increment(1);
                }
                Err(e) => {
                    // Output is persisted but the record write lost; the
                    // sweeper will requeue and the next attempt redoes it.
                    warn!(job_id = %job_id, "Success record failed: {}", e);
                }
            }
        }
        Err(e) if e.is_lost_lease() => {
            info!(job_id = %job_id, "Lease lost mid-attempt, abandoning: {}", e);
            counter!("vdet_jobs_lease_lost_total").increment(1);
        }
        Err(e) => {
            warn!(job_id = %job_id, retriable = e.is_retriable(), "Attempt failed: {}", e);
            match registry
                .record_failure(&job_id, e.to_job_error(), e.is_retriable())
                .await
            {
                Ok(FailureOutcome::Requeued) => {
                    counter!("vdet_jobs_retried_total").increment(1);
                    if let Err(enq) = broker.enqueue(&job_id).await {
                        // The sweeper will find the Queued job later.
                        error!(job_id = %job_id, "Re-enqueue failed: {}", enq);
                    }
                }
                Ok(FailureOutcome::Failed) => {
                    counter!("vdet_jobs_failed_total").increment(1);
                }
                Err(rec) => {
                    warn!(job_id = %job_id, "Failure record failed: {}", rec);
                }
            }
        }
    }

    ack(broker, lease).await;
}

async fn ack(broker: &dyn Broker, lease: &Lease) {
    if let Err(e) = broker.ack(lease).await {
        warn!(message_id = %lease.message_id, "Ack failed: {}", e);
    }
}
