//! Raw frame decoding via FFmpeg rawvideo pipes.
//!
//! FFmpeg writes raw pixel data to stdout; frames are read one at a time so
//! memory stays proportional to a single frame, not to clip length. Streams
//! are lazy, finite, and non-restartable.

use image::RgbImage;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Pixel format of a raw frame stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Single-channel 8-bit grayscale
    Gray,
    /// Interleaved 8-bit RGB
    Rgb24,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::Rgb24 => 3,
        }
    }

    /// FFmpeg `-pix_fmt` argument value.
    pub fn as_arg(&self) -> &'static str {
        match self {
            PixelFormat::Gray => "gray",
            PixelFormat::Rgb24 => "rgb24",
        }
    }
}

/// A stream of fixed-size raw frames decoded by an FFmpeg child process.
pub struct RawVideoStream {
    child: Child,
    stdout: BufReader<ChildStdout>,
    frame_len: usize,
    width: u32,
    height: u32,
    finished: bool,
}

impl RawVideoStream {
    /// Spawn an FFmpeg decode of `path` into raw frames of `width`×`height`
    /// in the given pixel format, with an optional video filter applied.
    pub async fn open(
        path: impl AsRef<Path>,
        pix_fmt: PixelFormat,
        width: u32,
        height: u32,
        filter: Option<&str>,
    ) -> MediaResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-i"]).arg(path);

        if let Some(filter) = filter {
            cmd.args(["-vf", filter, "-vsync", "vfr"]);
        }

        cmd.args(["-pix_fmt", pix_fmt.as_arg(), "-f", "rawvideo", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        debug!("Spawning rawvideo decode of {}", path.display());

        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            frame_len: width as usize * height as usize * pix_fmt.bytes_per_pixel(),
            width,
            height,
            finished: false,
        })
    }

    /// Frame dimensions of this stream.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Read the next frame, or `None` once the stream is exhausted.
    pub async fn next_frame(&mut self) -> MediaResult<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_len];
        let mut filled = 0;
        while filled < self.frame_len {
            let n = self.stdout.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == self.frame_len {
            return Ok(Some(buf));
        }

        if filled > 0 {
            warn!(
                "Discarding truncated trailing frame ({} of {} bytes)",
                filled, self.frame_len
            );
        }
        self.finished = true;
        self.reap().await;
        Ok(None)
    }

    /// Stop decoding and reap the child process. Safe to call early.
    pub async fn finish(mut self) -> MediaResult<()> {
        if !self.finished {
            // Early shutdown: the child may still be writing frames.
            let _ = self.child.kill().await;
        }
        self.reap().await;
        Ok(())
    }

    async fn reap(&mut self) {
        match self.child.wait().await {
            Ok(status) if !status.success() && self.finished => {
                // The pipe closing early makes FFmpeg exit non-zero; a decode
                // that produced frames and then ended is not an error here.
                debug!("Decode process exited with {:?}", status.code());
            }
            Err(e) => warn!("Failed to reap decode process: {}", e),
            _ => {}
        }
    }
}

/// Decode only the first frame of a file as RGB.
pub async fn first_frame(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
) -> MediaResult<Option<RgbImage>> {
    let mut stream = RawVideoStream::open(path, PixelFormat::Rgb24, width, height, None).await?;
    let frame = stream.next_frame().await?;
    stream.finish().await?;
    Ok(frame.and_then(|data| RgbImage::from_raw(width, height, data)))
}

/// Decode a file and keep only its last frame as RGB.
pub async fn last_frame(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
) -> MediaResult<Option<RgbImage>> {
    let mut stream = RawVideoStream::open(path, PixelFormat::Rgb24, width, height, None).await?;
    let mut last = None;
    while let Some(data) = stream.next_frame().await? {
        last = Some(data);
    }
    stream.finish().await?;
    Ok(last.and_then(|data| RgbImage::from_raw(width, height, data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format() {
        assert_eq!(PixelFormat::Gray.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::Rgb24.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Gray.as_arg(), "gray");
        assert_eq!(PixelFormat::Rgb24.as_arg(), "rgb24");
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let result = RawVideoStream::open(
            "/nonexistent/video.mp4",
            PixelFormat::Gray,
            160,
            120,
            None,
        )
        .await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }
}
