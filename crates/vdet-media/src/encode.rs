//! H.264 encoding of annotated frames via an ffmpeg stdin pipe.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::debug;

use crate::codec::FrameSink;
use crate::command::wait_with_stderr;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Feeds rgb24 frames into `ffmpeg -f rawvideo -i pipe:0` producing an
/// H.264 MP4, the same browser-compatible encode the pipeline has always
/// shipped (`libx264 -preset veryfast -crf 23`).
pub struct FfmpegFrameSink {
    child: Child,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
    frames_written: u64,
    output: PathBuf,
}

impl FfmpegFrameSink {
    /// Spawn the encoder writing to the given path.
    pub async fn create(path: &Path, width: u32, height: u32, fps: f64) -> MediaResult<Self> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let size = format!("{}x{}", width, height);
        let rate = format!("{:.3}", if fps > 0.0 { fps } else { 25.0 });

        let mut child = Command::new("ffmpeg")
            .args(["-y", "-v", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &size, "-r", &rate])
            .args(["-i", "pipe:0"])
            .args(["-c:v", "libx264", "-preset", "veryfast", "-crf", "23"])
            .args(["-pix_fmt", "yuv420p"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stdin not captured", None, None))?;

        debug!(path = %path.display(), size, rate, "Opened frame sink");

        Ok(Self {
            child,
            stdin: Some(stdin),
            width,
            height,
            frames_written: 0,
            output: path.to_path_buf(),
        })
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

#[async_trait]
impl FrameSink for FfmpegFrameSink {
    async fn write_frame(&mut self, frame: &Frame) -> MediaResult<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(MediaError::FrameSizeMismatch {
                expected: Frame::byte_len(self.width, self.height),
                actual: frame.data.len(),
            });
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::ffmpeg_failed("sink already finished", None, None))?;
        stdin.write_all(&frame.data).await?;
        self.frames_written += 1;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> MediaResult<()> {
        // Closing stdin signals EOF; ffmpeg then finalizes the container.
        drop(self.stdin.take());

        let (status, stderr) = wait_with_stderr(&mut self.child).await?;
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                "ffmpeg encode failed",
                Some(stderr),
                status.code(),
            ));
        }

        debug!(
            path = %self.output.display(),
            frames = self.frames_written,
            "Finalized annotated output"
        );
        Ok(())
    }
}
