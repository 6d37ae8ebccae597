//! The per-job pipeline state machine.
//!
//! `Sampling -> Matching -> Splitting -> StabilizingHead -> StabilizingTail
//! -> Blending -> Assembling -> Done`, with the stabilizing stages skipped
//! when stabilization is off and the blending stage skipped when no
//! transition is requested. Any unrecoverable error fails the job; the
//! workspace is released on every exit path and nothing is published to the
//! output path unless the whole pipeline succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

use loopfix_media::fs_utils::move_file;
use loopfix_media::{
    assemble, cross_dissolve, extract_segment, find_seam, first_frame, last_frame, min_gap_frames,
    probe_video, stabilize_segment, AssembleMode, GrayFrame, MediaError, RawFrameSink,
    SampledFrames, VideoInfo, SAMPLE_STRIDE,
};
use loopfix_models::{
    split_at_midpoint, EncodingConfig, JobId, JobRequest, JobStage, PipelineShape,
};

use crate::config::WorkerConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::progress::JobProgress;
use crate::workspace::JobWorkspace;

/// Run one job to completion.
///
/// Returns the published output path. On failure or cancellation the
/// output path is untouched and the job workspace is removed.
pub async fn run_job(
    request: &JobRequest,
    job_id: &JobId,
    config: &WorkerConfig,
    progress: &Arc<JobProgress>,
    cancel: watch::Receiver<bool>,
) -> PipelineResult<PathBuf> {
    request.validate()?;

    let workspace = JobWorkspace::create(config.work_dir.as_deref())?;
    let result = run_stages(request, job_id, &workspace, progress, &cancel).await;
    // Released on success, failure, and cancellation alike.
    workspace.close();
    result
}

async fn run_stages(
    request: &JobRequest,
    job_id: &JobId,
    ws: &JobWorkspace,
    progress: &Arc<JobProgress>,
    cancel: &watch::Receiver<bool>,
) -> PipelineResult<PathBuf> {
    let logger = JobLogger::new(job_id);
    let shape = request.shape();
    let encoding = EncodingConfig::default();

    logger.log_start(&format!(
        "repairing {} ({})",
        request.input_path.display(),
        shape
    ));
    ensure_live(cancel)?;

    // Sampling
    let info = probe_video(&request.input_path)
        .await
        .map_err(PipelineError::decode)?;
    if !(info.duration > 0.0) {
        return Err(PipelineError::Decode(MediaError::InvalidVideo(
            "source has no measurable duration".to_string(),
        )));
    }
    let required = 2.0 * request.min_gap_seconds;
    if info.duration < required {
        return Err(PipelineError::InsufficientDuration {
            duration: info.duration,
            required,
        });
    }

    logger.log_stage(
        JobStage::Sampling,
        &format!("sampling {:.1}s at {:.2} fps", info.duration, info.fps),
    );
    let frames = sample_frames(request, &info, progress, cancel).await?;

    // Matching
    logger.log_stage(
        JobStage::Matching,
        &format!("searching {} sampled frames for a seam", frames.len()),
    );
    let min_gap = min_gap_frames(request.min_gap_seconds, info.fps);
    let seam = find_seam(&frames, min_gap, Some(cancel), |f| {
        progress.report(JobStage::Matching, f)
    });
    drop(frames);
    ensure_live(cancel)?;
    let seam = seam.ok_or(PipelineError::InsufficientDuration {
        duration: info.duration,
        required,
    })?;

    let (t_a, t_b) = seam.timestamps(SAMPLE_STRIDE, info.fps);
    let t_b = t_b.min(info.duration);
    logger.log_stage(
        JobStage::Matching,
        &format!(
            "seam at {:.2}s / {:.2}s (score {:.3})",
            t_a, t_b, seam.score
        ),
    );

    // Splitting: cut the usable range at its midpoint; the tail plays
    // first so the matched frames land at the output's two ends.
    progress.report(JobStage::Splitting, 0.0);
    let (tail, head) = split_at_midpoint(&request.input_path, t_a, t_b);
    extract_segment(
        &tail.source,
        &ws.tail,
        tail.start_secs,
        tail.duration(),
        Some(cancel.clone()),
    )
    .await
    .map_err(PipelineError::extraction)?;
    progress.report(JobStage::Splitting, 0.5);
    extract_segment(
        &head.source,
        &ws.head,
        head.start_secs,
        head.duration(),
        Some(cancel.clone()),
    )
    .await
    .map_err(PipelineError::extraction)?;
    progress.report(JobStage::Splitting, 1.0);

    // Stabilizing, head then tail
    let mut tail_part = ws.tail.clone();
    let mut head_part = ws.head.clone();
    if shape.stabilizes() {
        logger.log_stage(JobStage::StabilizingHead, "stabilizing head segment");
        stabilize_part(&ws.head, &ws.head_stabilized, &encoding, cancel, |f| {
            progress.report(JobStage::StabilizingHead, f)
        })
        .await?;

        logger.log_stage(JobStage::StabilizingTail, "stabilizing tail segment");
        stabilize_part(&ws.tail, &ws.tail_stabilized, &encoding, cancel, |f| {
            progress.report(JobStage::StabilizingTail, f)
        })
        .await?;

        tail_part = ws.tail_stabilized.clone();
        head_part = ws.head_stabilized.clone();
    }

    // Blending
    let mut parts = vec![tail_part.clone()];
    let mut transition_secs = 0.0;
    if shape.blends() {
        ensure_live(cancel)?;
        logger.log_stage(JobStage::Blending, "synthesizing cross-dissolve");
        progress.report(JobStage::Blending, 0.0);
        match build_transition(request, ws, &tail_part, &head_part, &encoding, cancel).await? {
            Some(secs) => {
                parts.push(ws.transition.clone());
                transition_secs = secs;
            }
            // Non-fatal: a missing source frame degrades to a hard cut
            None => logger.log_warning("transition source frame unavailable, using hard cut"),
        }
        progress.report(JobStage::Blending, 1.0);
    }
    parts.push(head_part);

    // Assembling
    ensure_live(cancel)?;
    logger.log_stage(
        JobStage::Assembling,
        &format!("concatenating {} parts", parts.len()),
    );
    progress.report(JobStage::Assembling, 0.0);
    let mode = assemble_mode(shape);
    if mode == AssembleMode::Reencode && info.has_audio {
        // Stabilized segments are video-only and a synthesized transition
        // has no audio, so a uniform concat must drop the audio track.
        logger.log_warning("source audio is dropped by the re-encoded output");
    }
    let expected_ms = (((t_b - t_a) + transition_secs) * 1000.0) as i64;
    let assembling = Arc::clone(progress);
    assemble(
        &parts,
        &ws.concat_list,
        &ws.output,
        &encoding,
        mode,
        Some(cancel.clone()),
        move |p| assembling.report(JobStage::Assembling, p.fraction(expected_ms)),
    )
    .await
    .map_err(PipelineError::encode)?;

    // Publish only on full success
    move_file(&ws.output, &request.output_path)
        .await
        .map_err(PipelineError::encode)?;
    progress.finish();
    logger.log_completion(&format!("published {}", request.output_path.display()));
    Ok(request.output_path.clone())
}

/// Materialize the sampled sequence in memory for the all-pairs search.
async fn sample_frames(
    request: &JobRequest,
    info: &VideoInfo,
    progress: &Arc<JobProgress>,
    cancel: &watch::Receiver<bool>,
) -> PipelineResult<Vec<GrayFrame>> {
    let mut sampler = SampledFrames::open(&request.input_path, info.fps)
        .await
        .map_err(PipelineError::decode)?;
    let expected = SampledFrames::expected_frames(info.duration, info.fps);

    let mut frames = Vec::with_capacity(expected);
    loop {
        if *cancel.borrow() {
            let _ = sampler.finish().await;
            return Err(PipelineError::Cancelled);
        }
        match sampler.next().await.map_err(PipelineError::decode)? {
            Some(frame) => {
                frames.push(frame);
                if frames.len() % 25 == 0 {
                    progress.report(JobStage::Sampling, frames.len() as f64 / expected as f64);
                }
            }
            None => break,
        }
    }
    sampler.finish().await.map_err(PipelineError::decode)?;
    progress.report(JobStage::Sampling, 1.0);

    if frames.is_empty() {
        return Err(PipelineError::Decode(MediaError::InvalidVideo(
            "no frames decoded from source".to_string(),
        )));
    }
    Ok(frames)
}

/// Stabilize one segment into a new file.
async fn stabilize_part(
    input: &Path,
    output: &Path,
    encoding: &EncodingConfig,
    cancel: &watch::Receiver<bool>,
    progress: impl Fn(f64),
) -> PipelineResult<()> {
    let info = probe_video(input).await.map_err(PipelineError::decode)?;
    stabilize_segment(input, output, &info, encoding, Some(cancel.clone()), progress)
        .await
        .map_err(PipelineError::encode)?;
    Ok(())
}

/// Synthesize and encode the cross-dissolve clip.
///
/// Returns the transition duration in seconds, or `None` (non-fatal) when
/// either boundary frame is unavailable.
async fn build_transition(
    request: &JobRequest,
    ws: &JobWorkspace,
    tail_part: &Path,
    head_part: &Path,
    encoding: &EncodingConfig,
    cancel: &watch::Receiver<bool>,
) -> PipelineResult<Option<f64>> {
    let seg_info = probe_video(tail_part).await.map_err(PipelineError::encode)?;

    let last = last_frame(tail_part, seg_info.width, seg_info.height)
        .await
        .map_err(PipelineError::encode)?;
    let first = first_frame(head_part, seg_info.width, seg_info.height)
        .await
        .map_err(PipelineError::encode)?;
    let (Some(last), Some(first)) = (last, first) else {
        return Ok(None);
    };

    let frames = cross_dissolve(&last, &first, request.transition_frame_count);
    if frames.is_empty() {
        return Ok(None);
    }

    let mut sink = RawFrameSink::create(
        &ws.transition,
        seg_info.width,
        seg_info.height,
        seg_info.fps,
        encoding,
    )
    .await
    .map_err(PipelineError::encode)?;
    for frame in &frames {
        if *cancel.borrow() {
            sink.abort().await;
            return Err(PipelineError::Cancelled);
        }
        sink.write_frame(frame.as_raw())
            .await
            .map_err(PipelineError::encode)?;
    }
    sink.finish().await.map_err(PipelineError::encode)?;

    Ok(Some(frames.len() as f64 / seg_info.fps))
}

/// CutOnly reassembly is a lossless stream-copy reorder; any other shape
/// introduces synthesized or re-rendered frames and must re-encode.
fn assemble_mode(shape: PipelineShape) -> AssembleMode {
    if shape == PipelineShape::CutOnly {
        AssembleMode::StreamCopy
    } else {
        AssembleMode::Reencode
    }
}

fn ensure_live(cancel: &watch::Receiver<bool>) -> PipelineResult<()> {
    if *cancel.borrow() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressSink;
    use tempfile::TempDir;

    struct NullSink;
    impl ProgressSink for NullSink {
        fn progress(&self, _job: &JobId, _percent: u8) {}
    }

    fn progress() -> Arc<JobProgress> {
        Arc::new(JobProgress::new(JobId::new(), Arc::new(NullSink)))
    }

    #[test]
    fn test_assemble_mode_per_shape() {
        assert_eq!(
            assemble_mode(PipelineShape::CutOnly),
            AssembleMode::StreamCopy
        );
        assert_eq!(
            assemble_mode(PipelineShape::Stabilized),
            AssembleMode::Reencode
        );
        assert_eq!(assemble_mode(PipelineShape::Blended), AssembleMode::Reencode);
        assert_eq!(
            assemble_mode(PipelineShape::StabilizedBlended),
            AssembleMode::Reencode
        );
    }

    #[tokio::test]
    async fn test_invalid_request_rejected_before_work() {
        let request = JobRequest::new("in.mp4", "out.mp4").with_min_gap(0.0);
        let (_tx, rx) = watch::channel(false);
        let err = run_job(
            &request,
            &JobId::new(),
            &WorkerConfig::default(),
            &progress(),
            rx,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[tokio::test]
    async fn test_cancelled_job_leaves_no_output_and_no_workspace() {
        let out_dir = TempDir::new().unwrap();
        let work_parent = TempDir::new().unwrap();
        let output = out_dir.path().join("repaired.mp4");

        let request = JobRequest::new("/nonexistent/source.mp4", &output);
        let config = WorkerConfig {
            max_concurrent_jobs: 1,
            work_dir: Some(work_parent.path().to_path_buf()),
        };

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let err = run_job(&request, &JobId::new(), &config, &progress(), rx)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!output.exists());

        // Workspace removed from the configured work dir
        let residual = std::fs::read_dir(work_parent.path()).unwrap().count();
        assert_eq!(residual, 0);
    }

    #[tokio::test]
    async fn test_missing_input_fails_with_decode_error() {
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("repaired.mp4");
        let request = JobRequest::new("/nonexistent/source.mp4", &output);

        let (_tx, rx) = watch::channel(false);
        let err = run_job(
            &request,
            &JobId::new(),
            &WorkerConfig::default(),
            &progress(),
            rx,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "decode");
        assert!(!output.exists());
    }
}
