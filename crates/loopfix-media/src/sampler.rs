//! Reduced-rate, reduced-resolution frame sampling for the seam search.
//!
//! FFmpeg does the heavy lifting: a `select` filter keeps every Nth decoded
//! frame and `scale` shrinks it to a fixed comparison size, so the pipe
//! carries a fraction of the source data. A small Gaussian blur suppresses
//! sensor noise before frames are compared.

use image::imageops;
use image::GrayImage;
use std::path::Path;

use crate::decode::{PixelFormat, RawVideoStream};
use crate::error::{MediaError, MediaResult};
use crate::frame::GrayFrame;

/// Keep every Nth decoded frame.
pub const SAMPLE_STRIDE: usize = 5;
/// Comparison resolution, independent of source resolution.
pub const SAMPLE_WIDTH: u32 = 160;
pub const SAMPLE_HEIGHT: u32 = 120;
/// Blur sigma approximating a 3x3 Gaussian kernel.
const SAMPLE_BLUR_SIGMA: f32 = 0.8;

/// Minimum seam gap converted to sampled-frame units, always at least 1.
pub fn min_gap_frames(min_gap_seconds: f64, source_fps: f64) -> usize {
    ((min_gap_seconds * source_fps / SAMPLE_STRIDE as f64).ceil() as usize).max(1)
}

/// Timestamp of a sampled-frame index on the source timeline.
pub fn sampled_timestamp(index: usize, source_fps: f64) -> f64 {
    (index * SAMPLE_STRIDE) as f64 / source_fps
}

/// Lazy, finite, non-restartable stream of sampled grayscale frames.
pub struct SampledFrames {
    stream: RawVideoStream,
    next_index: usize,
    source_fps: f64,
}

impl SampledFrames {
    /// Open the sampled stream for a source video.
    pub async fn open(path: impl AsRef<Path>, source_fps: f64) -> MediaResult<Self> {
        let filter = format!(
            "select=not(mod(n\\,{})),scale={}:{}",
            SAMPLE_STRIDE, SAMPLE_WIDTH, SAMPLE_HEIGHT
        );
        let stream = RawVideoStream::open(
            path,
            PixelFormat::Gray,
            SAMPLE_WIDTH,
            SAMPLE_HEIGHT,
            Some(&filter),
        )
        .await?;

        Ok(Self {
            stream,
            next_index: 0,
            source_fps,
        })
    }

    /// Read the next sampled frame, blurred and indexed.
    pub async fn next(&mut self) -> MediaResult<Option<GrayFrame>> {
        let Some(data) = self.stream.next_frame().await? else {
            return Ok(None);
        };

        let raw = GrayImage::from_raw(SAMPLE_WIDTH, SAMPLE_HEIGHT, data)
            .ok_or_else(|| MediaError::internal("sampled frame buffer size mismatch"))?;
        let pixels = imageops::blur(&raw, SAMPLE_BLUR_SIGMA);

        let index = self.next_index;
        self.next_index += 1;

        Ok(Some(GrayFrame {
            index,
            source_frame: index * SAMPLE_STRIDE,
            timestamp_secs: sampled_timestamp(index, self.source_fps),
            pixels,
        }))
    }

    /// Number of frames read so far.
    pub fn frames_read(&self) -> usize {
        self.next_index
    }

    /// Expected number of sampled frames for a source of `duration` seconds.
    pub fn expected_frames(duration: f64, source_fps: f64) -> usize {
        ((duration * source_fps / SAMPLE_STRIDE as f64).ceil() as usize).max(1)
    }

    /// Stop sampling and reap the decoder. Safe to call early.
    pub async fn finish(self) -> MediaResult<()> {
        self.stream.finish().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_gap_frames() {
        // 10 seconds at 30 fps, stride 5 => 60 sampled frames
        assert_eq!(min_gap_frames(10.0, 30.0), 60);
        // Rounds up
        assert_eq!(min_gap_frames(0.9, 30.0), 6);
        // Never zero
        assert_eq!(min_gap_frames(0.01, 30.0), 1);
    }

    #[test]
    fn test_sampled_timestamp() {
        assert_eq!(sampled_timestamp(0, 30.0), 0.0);
        // Sampled index 6 => source frame 30 => 1 second at 30 fps
        assert!((sampled_timestamp(6, 30.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_expected_frames() {
        assert_eq!(SampledFrames::expected_frames(40.0, 30.0), 240);
        assert_eq!(SampledFrames::expected_frames(0.0, 30.0), 1);
    }
}
