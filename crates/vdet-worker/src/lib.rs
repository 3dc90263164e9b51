//! Worker pool and job execution for the detection pipeline.
//!
//! This crate wires the other crates together:
//! - `JobService` is the submission-side facade
//! - `JobExecutor` runs worker loops that claim and process jobs
//! - `ProcessingContext` runs one decode/detect/annotate/persist attempt
//! - `StaleSweeper` recovers jobs orphaned by crashed workers

pub mod config;
pub mod error;
pub mod executor;
pub mod processor;
pub mod service;
pub mod sweeper;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use processor::{ProcessOutput, ProcessingContext};
pub use service::JobService;
pub use sweeper::StaleSweeper;
