//! FFmpeg CLI wrapper for the detection pipeline.
//!
//! This crate provides:
//! - Video probing via ffprobe (JSON output)
//! - Lazy frame streaming from an ffmpeg rawvideo pipe
//! - H.264 encoding of annotated frames
//! - Pure-Rust bounding-box annotation
//!
//! The `VideoCodec` trait is the seam the worker holds; tests substitute a
//! synthetic codec and never touch ffmpeg.

pub mod annotate;
pub mod codec;
mod command;
pub mod decode;
pub mod encode;
pub mod error;
pub mod frame;
pub mod probe;

pub use annotate::{color_for_label, draw_detections, stroke_thickness};
pub use codec::{FfmpegCodec, FrameSink, FrameSource, VideoCodec};
pub use decode::FfmpegFrameSource;
pub use encode::FfmpegFrameSink;
pub use error::{MediaError, MediaResult};
pub use frame::Frame;
pub use probe::probe_video;
