//! Submission-side facade over store, registry and broker.

use std::sync::Arc;

use metrics::counter;
use tracing::info;

use vdet_models::{DetectionResult, Job, JobId};
use vdet_queue::Broker;
use vdet_registry::JobRegistry;
use vdet_storage::{results::load_detection_result, AssetStore};

use crate::error::WorkerResult;

/// Entry points for submitting and inspecting jobs.
///
/// Each submission stores its own asset and allocates its own job: two
/// submissions of identical bytes are two independent jobs.
pub struct JobService {
    store: Arc<dyn AssetStore>,
    registry: Arc<dyn JobRegistry>,
    broker: Arc<dyn Broker>,
}

impl JobService {
    pub fn new(
        store: Arc<dyn AssetStore>,
        registry: Arc<dyn JobRegistry>,
        broker: Arc<dyn Broker>,
    ) -> Self {
        Self {
            store,
            registry,
            broker,
        }
    }

    /// Store a video and enqueue a detection job for it.
    pub async fn submit(&self, video_bytes: Vec<u8>) -> WorkerResult<Job> {
        let asset_id = self.store.store(video_bytes).await?;
        let job = self.registry.create(asset_id).await?;
        self.broker.enqueue(&job.id).await?;

        info!(job_id = %job.id, asset_id = %job.video_asset_id, "Submitted job");
        counter!("vdet_jobs_submitted_total").increment(1);
        Ok(job)
    }

    /// Current job record: state, attempts, progress counters, outputs.
    pub async fn status(&self, job_id: &JobId) -> WorkerResult<Job> {
        Ok(self.registry.get(job_id).await?)
    }

    /// The persisted detection result, once the job is Done.
    pub async fn fetch_result(&self, job_id: &JobId) -> WorkerResult<Option<DetectionResult>> {
        let job = self.registry.get(job_id).await?;
        match job.result_ref {
            Some(ref result_ref) => Ok(Some(
                load_detection_result(self.store.as_ref(), result_ref).await?,
            )),
            None => Ok(None),
        }
    }

    /// The annotated output video, once the job is Done and annotation was
    /// enabled.
    pub async fn fetch_annotated(&self, job_id: &JobId) -> WorkerResult<Option<Vec<u8>>> {
        let job = self.registry.get(job_id).await?;
        match job.output_asset_id {
            Some(ref asset_id) => Ok(Some(self.store.load(asset_id).await?)),
            None => Ok(None),
        }
    }

    /// Cancel a job that no worker has claimed yet.
    pub async fn cancel(&self, job_id: &JobId) -> WorkerResult<Job> {
        let job = self.registry.cancel(job_id).await?;
        info!(job_id = %job.id, "Cancelled job");
        counter!("vdet_jobs_cancelled_total").increment(1);
        Ok(job)
    }
}
