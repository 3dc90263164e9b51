//! One processing attempt: decode, detect, annotate, persist.

use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, info};

use vdet_engine::DetectionEngine;
use vdet_media::{draw_detections, VideoCodec};
use vdet_models::{AssetId, DetectionResult, FrameDetections, Job};
use vdet_registry::JobRegistry;
use vdet_storage::{results::store_detection_result, AssetStore};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;

/// Everything produced by a successful attempt.
#[derive(Debug)]
pub struct ProcessOutput {
    /// Reference to the persisted detection result
    pub result_ref: String,
    /// Annotated output video, when annotation is enabled
    pub output_asset_id: Option<AssetId>,
    /// Frames actually decoded and inferred
    pub processed_frames: u64,
    /// Total detections across all frames
    pub detections_count: u64,
}

/// Shared capabilities one attempt runs against.
pub struct ProcessingContext {
    pub store: Arc<dyn AssetStore>,
    pub registry: Arc<dyn JobRegistry>,
    pub codec: Arc<dyn VideoCodec>,
    pub engine: Arc<dyn DetectionEngine>,
}

impl ProcessingContext {
    /// Run one full processing attempt for a claimed job.
    ///
    /// The job must already be in Processing and owned by this worker. Any
    /// registry Conflict along the way means the lease was reclaimed; the
    /// caller abandons the attempt without recording a failure.
    pub async fn process_job(&self, job: &Job, config: &WorkerConfig) -> WorkerResult<ProcessOutput> {
        tokio::fs::create_dir_all(&config.work_dir).await?;
        let scratch = TempDir::with_prefix_in(format!("job-{}-", job.id), &config.work_dir)?;

        // Materialize the input so ffmpeg can seek it.
        let input_path = scratch.path().join("input.mp4");
        let bytes = self.store.load(&job.video_asset_id).await?;
        tokio::fs::write(&input_path, &bytes).await?;
        drop(bytes);

        let meta = self.codec.probe(&input_path).await?;
        debug!(
            job_id = %job.id,
            width = meta.width,
            height = meta.height,
            fps = meta.fps,
            frames = meta.frame_count,
            "Probed input video"
        );

        // Publish the probed total; a Conflict here means we no longer own
        // the job.
        self.registry
            .update_progress(&job.id, job.lease_epoch, meta.frame_count, 0, 0)
            .await?;

        let mut source = self.codec.open(&input_path, &meta).await?;

        let output_path = scratch.path().join("annotated.mp4");
        let mut sink = if config.annotate_output {
            Some(
                self.codec
                    .open_writer(&output_path, meta.width, meta.height, meta.fps)
                    .await?,
            )
        } else {
            None
        };

        let mut result = DetectionResult::new();
        let mut processed: u64 = 0;
        let mut detections_count: u64 = 0;

        while let Some(mut frame) = source.next_frame().await? {
            let detections = self.engine.detect(&frame).await?;
            detections_count += detections.len() as u64;

            result.push(FrameDetections::new(
                frame.index,
                meta.frame_timestamp(frame.index),
                detections.clone(),
            ))?;

            if let Some(sink) = sink.as_mut() {
                draw_detections(&mut frame, &detections);
                sink.write_frame(&frame).await?;
            }

            processed += 1;
            if processed % config.progress_stride == 0 {
                self.registry
                    .update_progress(
                        &job.id,
                        job.lease_epoch,
                        meta.frame_count.max(processed),
                        processed,
                        detections_count,
                    )
                    .await?;
            }
        }

        // A zero-frame input completes with an empty result; there is
        // nothing to encode, so no output asset either.
        let output_asset_id = match sink {
            Some(sink) if processed > 0 => {
                sink.finish().await?;
                let encoded = tokio::fs::read(&output_path).await?;
                Some(self.store.store(encoded).await?)
            }
            _ => None,
        };

        // The decoded count is authoritative; the probe's frame_count was an
        // estimate for some containers.
        self.registry
            .update_progress(&job.id, job.lease_epoch, processed, processed, detections_count)
            .await?;

        let result_ref = store_detection_result(self.store.as_ref(), &result).await?;

        info!(
            job_id = %job.id,
            frames = processed,
            detections = detections_count,
            annotated = output_asset_id.is_some(),
            "Processing attempt complete"
        );

        Ok(ProcessOutput {
            result_ref,
            output_asset_id,
            processed_frames: processed,
            detections_count,
        })
    }
}
