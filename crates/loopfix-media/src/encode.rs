//! Raw frame encoding via an FFmpeg rawvideo stdin pipe.

use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tracing::debug;

use loopfix_models::EncodingConfig;

use crate::error::{MediaError, MediaResult};

/// Sink that feeds raw RGB24 frames into an FFmpeg encoder child process.
///
/// Frames must all match the dimensions given at creation. Call
/// [`RawFrameSink::finish`] to close the pipe and wait for the encoder;
/// dropping the sink without finishing kills the child and leaves a
/// truncated output file.
pub struct RawFrameSink {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    frame_len: usize,
}

impl RawFrameSink {
    /// Spawn an FFmpeg encoder reading rawvideo RGB24 from stdin.
    ///
    /// The output is video-only (any notion of audio is dropped).
    pub async fn create(
        output: impl AsRef<Path>,
        width: u32,
        height: u32,
        fps: f64,
        encoding: &EncodingConfig,
    ) -> MediaResult<Self> {
        let output = output.as_ref();
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args([
            "-y",
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
        ])
        .arg(format!("{}x{}", width, height))
        .arg("-r")
        .arg(format!("{:.6}", fps))
        .args(["-i", "pipe:0", "-an"])
        .args(encoding.video_args())
        .arg(output)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

        debug!("Spawning rawvideo encode to {}", output.display());

        let mut child = cmd.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdin not captured"))?;

        Ok(Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            frame_len: width as usize * height as usize * 3,
        })
    }

    /// Write one RGB24 frame.
    pub async fn write_frame(&mut self, data: &[u8]) -> MediaResult<()> {
        if data.len() != self.frame_len {
            return Err(MediaError::internal(format!(
                "frame size mismatch: expected {} bytes, got {}",
                self.frame_len,
                data.len()
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("encoder already finished"))?;
        stdin.write_all(data).await?;
        Ok(())
    }

    /// Close the pipe and wait for the encoder to finish the file.
    pub async fn finish(mut self) -> MediaResult<()> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().await?;
            stdin.shutdown().await?;
            drop(stdin);
        }

        let status = self.child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg encoder exited with non-zero status",
                None,
                status.code(),
            ))
        }
    }

    /// Kill the encoder without finalizing the output. Used on cancellation.
    pub async fn abort(mut self) {
        self.stdin.take();
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}
