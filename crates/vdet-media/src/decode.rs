//! Lazy frame decoding from an ffmpeg rawvideo pipe.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

use crate::codec::FrameSource;
use crate::command::wait_with_stderr;
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// Streams rgb24 frames from `ffmpeg -f rawvideo` on stdout.
///
/// Exactly `width * height * 3` bytes per frame; a clean EOF on a frame
/// boundary is end of stream, anything else is a decode failure.
pub struct FfmpegFrameSource {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    next_index: u64,
    done: bool,
}

impl FfmpegFrameSource {
    /// Spawn the decoder for a video file.
    pub async fn open(path: &Path, width: u32, height: u32) -> MediaResult<Self> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let mut child = Command::new("ffmpeg")
            .arg("-v")
            .arg("error")
            .arg("-i")
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::ffmpeg_failed("stdout not captured", None, None))?;

        debug!(path = %path.display(), width, height, "Opened frame source");

        Ok(Self {
            child,
            stdout,
            width,
            height,
            next_index: 0,
            done: false,
        })
    }

    async fn finish_child(&mut self) -> MediaResult<()> {
        let (status, stderr) = wait_with_stderr(&mut self.child).await?;
        if status.success() {
            Ok(())
        } else {
            Err(MediaError::InvalidVideo(format!(
                "ffmpeg decode failed: {}",
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.done {
            return Ok(None);
        }

        let frame_len = Frame::byte_len(self.width, self.height);
        let mut data = vec![0u8; frame_len];
        let mut filled = 0usize;

        while filled < frame_len {
            let n = self.stdout.read(&mut data[filled..]).await?;
            if n == 0 {
                self.done = true;
                if filled == 0 {
                    // Clean end of stream; surface any decoder error.
                    self.finish_child().await?;
                    return Ok(None);
                }
                // Truncated mid-frame: corrupt input or dying decoder.
                self.finish_child().await?;
                return Err(MediaError::FrameSizeMismatch {
                    expected: frame_len,
                    actual: filled,
                });
            }
            filled += n;
        }

        let frame = Frame {
            index: self.next_index,
            width: self.width,
            height: self.height,
            data,
        };
        self.next_index += 1;
        Ok(Some(frame))
    }
}
