//! Codec seam between the worker and ffmpeg.

use std::path::Path;

use async_trait::async_trait;

use vdet_models::VideoMetadata;

use crate::decode::FfmpegFrameSource;
use crate::encode::FfmpegFrameSink;
use crate::error::MediaResult;
use crate::frame::Frame;
use crate::probe::probe_video;

/// Lazy, ordered frame stream over one video.
///
/// Frames arrive in strictly increasing index order and are never all
/// resident; re-reading a video means opening a new source.
#[async_trait]
pub trait FrameSource: Send {
    /// Pull the next frame, or `None` at end of stream.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;
}

/// Ordered frame consumer producing an encoded video.
#[async_trait]
pub trait FrameSink: Send {
    /// Append one frame.
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()>;

    /// Flush and finalize the output.
    async fn finish(self: Box<Self>) -> MediaResult<()>;
}

/// Probe/decode/encode capability held by the worker.
#[async_trait]
pub trait VideoCodec: Send + Sync {
    /// Probe a video file for metadata.
    async fn probe(&self, path: &Path) -> MediaResult<VideoMetadata>;

    /// Open a lazy frame stream over a video file.
    async fn open(&self, path: &Path, meta: &VideoMetadata) -> MediaResult<Box<dyn FrameSource>>;

    /// Open an encoder writing H.264 output to the given path.
    async fn open_writer(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> MediaResult<Box<dyn FrameSink>>;
}

/// The production codec: ffprobe + ffmpeg subprocesses.
#[derive(Debug, Default, Clone)]
pub struct FfmpegCodec;

impl FfmpegCodec {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VideoCodec for FfmpegCodec {
    async fn probe(&self, path: &Path) -> MediaResult<VideoMetadata> {
        probe_video(path).await
    }

    async fn open(&self, path: &Path, meta: &VideoMetadata) -> MediaResult<Box<dyn FrameSource>> {
        Ok(Box::new(
            FfmpegFrameSource::open(path, meta.width, meta.height).await?,
        ))
    }

    async fn open_writer(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> MediaResult<Box<dyn FrameSink>> {
        Ok(Box::new(
            FfmpegFrameSink::create(path, width, height, fps).await?,
        ))
    }
}
