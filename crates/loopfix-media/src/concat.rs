//! Final assembly via the FFmpeg concat demuxer.

use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::info;

use loopfix_models::EncodingConfig;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::progress::FfmpegProgress;

/// How the concatenated parts are written to the output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssembleMode {
    /// Stream-copy every part. Requires identical codec parameters across
    /// parts; preserves frames (and audio) bit-for-bit.
    StreamCopy,
    /// Re-encode to a single video stream, dropping audio. Required when a
    /// synthesized transition or stabilized segment is in the list.
    Reencode,
}

/// Concatenate `parts` in order into `output`.
///
/// Writes a concat-demuxer list file at `list_path` and runs a single
/// FFmpeg pass. `progress` receives the encoder's progress reports.
pub async fn assemble<F>(
    parts: &[PathBuf],
    list_path: &Path,
    output: &Path,
    encoding: &EncodingConfig,
    mode: AssembleMode,
    cancel: Option<watch::Receiver<bool>>,
    progress: F,
) -> MediaResult<()>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    let mut list = String::new();
    for part in parts {
        list.push_str(&concat_entry(part));
    }
    tokio::fs::write(list_path, list).await?;

    info!(
        "Assembling {} parts -> {} ({:?})",
        parts.len(),
        output.display(),
        mode
    );

    let mut cmd = FfmpegCommand::new(list_path, output).input_args(["-f", "concat", "-safe", "0"]);

    cmd = match mode {
        AssembleMode::StreamCopy => cmd.codec_copy(),
        AssembleMode::Reencode => cmd.output_args(encoding.video_args()).no_audio(),
    };
    cmd = cmd.output_args(encoding.container_args());

    let mut runner = FfmpegRunner::new();
    if let Some(cancel) = cancel {
        runner = runner.with_cancel(cancel);
    }
    runner.run_with_progress(&cmd, progress).await
}

/// One line of a concat-demuxer list file, with single quotes escaped.
fn concat_entry(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', r"'\''");
    format!("file '{}'\n", escaped)
}
