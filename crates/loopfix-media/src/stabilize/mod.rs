//! Motion-compensated stabilization of a video segment.
//!
//! Each frame after the first is aligned to its predecessor: trackable
//! points are detected in the previous frame, tracked into the current one
//! with pyramidal Lucas-Kanade flow, and a robust partial affine transform
//! mapping the current frame back onto the predecessor's coordinate frame
//! is estimated and applied. Frames that cannot be tracked pass through
//! unwarped; a handful of unstabilized frames is preferable to losing the
//! job.
//!
//! Only the previous and current frames are resident at any time; decode
//! and re-encode run as FFmpeg rawvideo pipes on both sides.

pub mod features;
pub mod flow;
pub mod transform;

use image::RgbImage;
use std::path::Path;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use loopfix_models::EncodingConfig;

use crate::decode::{PixelFormat, RawVideoStream};
use crate::encode::RawFrameSink;
use crate::error::{MediaError, MediaResult};
use crate::frame::luma_plane;
use crate::probe::VideoInfo;

use features::{detect_corners, MAX_CORNERS, MIN_DISTANCE, QUALITY_LEVEL};
use flow::{track_points, Pyramid, PYRAMID_LEVELS};
use transform::{estimate_partial_affine, warp_rgb, MotionTransform, MIN_CORRESPONDENCES};

/// Outcome counters for a stabilized segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StabilizeReport {
    /// Frames written to the output.
    pub frames: u64,
    /// Frames passed through because tracking or estimation failed.
    pub skipped: u64,
}

/// Align one frame against its predecessor.
///
/// Returns the output frame (warped, or a pass-through clone) and the
/// estimated transform when alignment succeeded.
pub fn align_frame(
    prev: &Pyramid,
    curr: &Pyramid,
    curr_rgb: &RgbImage,
) -> (RgbImage, Option<MotionTransform>) {
    let corners = detect_corners(prev.base(), MAX_CORNERS, QUALITY_LEVEL, MIN_DISTANCE);
    if corners.len() < MIN_CORRESPONDENCES {
        return (curr_rgb.clone(), None);
    }

    let tracked = track_points(prev, curr, &corners);
    if tracked.len() < MIN_CORRESPONDENCES {
        return (curr_rgb.clone(), None);
    }

    match estimate_partial_affine(&tracked) {
        Some(t) => (warp_rgb(curr_rgb, &t), Some(t)),
        None => (curr_rgb.clone(), None),
    }
}

/// Stabilize a segment file into `output`.
///
/// The output has the same duration and frame count as the input; audio is
/// dropped. `progress` receives the fraction of frames processed and
/// cancellation is checked between frames.
pub async fn stabilize_segment(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    info: &VideoInfo,
    encoding: &EncodingConfig,
    cancel: Option<watch::Receiver<bool>>,
    progress: impl Fn(f64),
) -> MediaResult<StabilizeReport> {
    let input = input.as_ref();
    let output = output.as_ref();
    let (width, height) = (info.width, info.height);
    let total_frames = info.frame_count().max(1);

    info!(
        "Stabilizing segment: {} -> {} ({}x{}, ~{} frames)",
        input.display(),
        output.display(),
        width,
        height,
        total_frames
    );

    let mut stream = RawVideoStream::open(input, PixelFormat::Rgb24, width, height, None).await?;
    let mut sink = RawFrameSink::create(output, width, height, info.fps, encoding).await?;

    let mut report = StabilizeReport::default();
    let mut prev_pyramid: Option<Pyramid> = None;

    loop {
        if cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
            sink.abort().await;
            stream.finish().await?;
            return Err(MediaError::Cancelled);
        }

        let Some(data) = stream.next_frame().await? else {
            break;
        };
        let rgb = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| MediaError::internal("decoded frame buffer size mismatch"))?;
        let pyramid = Pyramid::new(luma_plane(&rgb), PYRAMID_LEVELS);

        let out_rgb = match &prev_pyramid {
            // The first frame has no predecessor to align to
            None => rgb.clone(),
            Some(prev) => {
                let (aligned, estimated) = align_frame(prev, &pyramid, &rgb);
                match estimated {
                    Some(t) => {
                        let (tx, ty) = t.translation();
                        debug!(frame = report.frames, tx, ty, "frame aligned");
                    }
                    None => {
                        report.skipped += 1;
                        warn!(frame = report.frames, "stabilization frame skipped");
                    }
                }
                aligned
            }
        };

        sink.write_frame(out_rgb.as_raw()).await?;

        // The next frame aligns against the original current frame, not the
        // warped one.
        prev_pyramid = Some(pyramid);
        report.frames += 1;
        progress(report.frames as f64 / total_frames as f64);
    }

    stream.finish().await?;
    sink.finish().await?;

    info!(
        "Stabilized {} frames ({} passed through) -> {}",
        report.frames,
        report.skipped,
        output.display()
    );
    Ok(report)
}
