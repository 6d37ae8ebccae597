//! Sub-clip extraction.

use std::path::Path;
use tokio::sync::watch;
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Extract a time-ranged segment from a video file without re-encoding.
///
/// Stream copy keeps this fast; the cut lands on the nearest keyframe,
/// which is acceptable at the sampled-frame granularity the seam search
/// works at.
pub async fn extract_segment(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    start_secs: f64,
    duration: f64,
    cancel: Option<watch::Receiver<bool>>,
) -> MediaResult<()> {
    let input = input.as_ref();
    let output = output.as_ref();

    info!(
        "Extracting segment: {} -> {} (start: {:.2}s, duration: {:.2}s)",
        input.display(),
        output.display(),
        start_secs,
        duration
    );

    let cmd = FfmpegCommand::new(input, output)
        .seek(start_secs)
        .duration(duration)
        .codec_copy();

    let mut runner = FfmpegRunner::new();
    if let Some(cancel) = cancel {
        runner = runner.with_cancel(cancel);
    }
    runner.run(&cmd).await?;

    info!("Segment extracted: {}", output.display());
    Ok(())
}
