//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent worker loops
    pub workers: usize,
    /// How long one dequeue call blocks before polling again
    pub dequeue_timeout: Duration,
    /// Hard ceiling on one processing attempt
    pub job_timeout: Duration,
    /// How often the sweeper scans for stale Processing jobs
    pub sweep_interval: Duration,
    /// A Processing job untouched for this long is presumed orphaned
    pub stale_after: Duration,
    /// Whether to render and store an annotated output video
    pub annotate_output: bool,
    /// Progress write-back cadence in frames
    pub progress_stride: u64,
    /// Work directory for temporary files
    pub work_dir: String,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            dequeue_timeout: Duration::from_secs(5),
            job_timeout: Duration::from_secs(1800),
            sweep_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(300),
            annotate_output: true,
            progress_stride: 10,
            work_dir: "/tmp/vdet".to_string(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: std::env::var("WORKER_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.workers),
            dequeue_timeout: secs_var("WORKER_DEQUEUE_TIMEOUT", defaults.dequeue_timeout),
            job_timeout: secs_var("WORKER_JOB_TIMEOUT", defaults.job_timeout),
            sweep_interval: secs_var("WORKER_SWEEP_INTERVAL", defaults.sweep_interval),
            stale_after: secs_var("WORKER_STALE_AFTER", defaults.stale_after),
            annotate_output: std::env::var("WORKER_ANNOTATE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.annotate_output),
            progress_stride: std::env::var("WORKER_PROGRESS_STRIDE")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.progress_stride),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
            shutdown_timeout: secs_var("WORKER_SHUTDOWN_TIMEOUT", defaults.shutdown_timeout),
        }
    }
}

fn secs_var(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
