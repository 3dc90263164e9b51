//! Stale-job sweeper.
//!
//! A worker that dies mid-attempt leaves its job in Processing with a
//! stalling `updated_at`. The sweeper forces such jobs back to Queued
//! through the registry and puts them back on the broker, which is how a
//! crashed worker's work gets retried.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use vdet_queue::Broker;
use vdet_registry::JobRegistry;

use crate::error::WorkerResult;

pub struct StaleSweeper {
    registry: Arc<dyn JobRegistry>,
    broker: Arc<dyn Broker>,
    interval: Duration,
    stale_after: Duration,
}

impl StaleSweeper {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        broker: Arc<dyn Broker>,
        interval: Duration,
        stale_after: Duration,
    ) -> Self {
        Self {
            registry,
            broker,
            interval,
            stale_after,
        }
    }

    /// One sweep: reclaim stale Processing jobs and re-enqueue them.
    pub async fn check_once(&self) -> WorkerResult<usize> {
        let reclaimed = self.registry.reclaim_stale(self.stale_after).await?;
        if reclaimed.is_empty() {
            return Ok(0);
        }

        warn!(count = reclaimed.len(), "Reclaimed stale jobs");
        counter!("vdet_jobs_reclaimed_total").increment(reclaimed.len() as u64);

        let mut requeued = 0;
        for job_id in &reclaimed {
            match self.broker.enqueue(job_id).await {
                Ok(()) => {
                    info!(job_id = %job_id, "Requeued stale job");
                    requeued += 1;
                }
                Err(e) => {
                    // Left in Queued; the next sweep's enqueue or a manual
                    // resubmit picks it up.
                    warn!(job_id = %job_id, "Requeue failed: {}", e);
                }
            }
        }

        Ok(requeued)
    }

    /// Sweep on an interval until shutdown.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            stale_after_secs = self.stale_after.as_secs(),
            "Starting stale-job sweeper"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    match self.check_once().await {
                        Ok(0) => debug!("Sweep found nothing stale"),
                        Ok(n) => debug!(requeued = n, "Sweep complete"),
                        Err(e) => warn!("Sweep failed: {}", e),
                    }
                }
            }
        }

        info!("Stale-job sweeper stopped");
    }
}
