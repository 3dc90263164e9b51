//! Object detection engine abstraction.
//!
//! `DetectionEngine` is the inference seam: the worker pulls detections for
//! one frame at a time and has no opinion about what model produces them.
//! `HttpEngine` talks to the inference sidecar over HTTP.

pub mod engine;
pub mod error;
pub mod http;

pub use engine::DetectionEngine;
pub use error::{EngineError, EngineResult};
pub use http::{EngineConfig, HttpEngine};
