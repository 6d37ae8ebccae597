//! Progress reporting.
//!
//! The caller owns a [`ProgressSink`] shared across jobs; each job maps its
//! stages' local progress into fixed windows on the 0-100 scale and clamps
//! the stream so reported percentages are monotonically non-decreasing,
//! regardless of stage skipping or out-of-order callbacks.

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use loopfix_models::{JobId, JobStage};

/// Sink for job progress and terminal signals. Must be safe for concurrent
/// use; one sink instance may serve many jobs.
pub trait ProgressSink: Send + Sync {
    /// Percentage update, 0-100, monotonically non-decreasing per job.
    fn progress(&self, job: &JobId, percent: u8);

    /// The job finished and its output is published.
    fn completed(&self, _job: &JobId, _output: &Path) {}

    /// The job failed or was cancelled; nothing was published.
    fn failed(&self, _job: &JobId, _kind: &str, _message: &str) {}
}

/// Progress window of each stage on the 0-100 job scale.
///
/// Skipped stages collapse: entering a later stage jumps straight to that
/// stage's window start.
fn stage_window(stage: JobStage) -> (u8, u8) {
    match stage {
        JobStage::Idle => (0, 0),
        JobStage::Sampling => (0, 25),
        JobStage::Matching => (25, 50),
        JobStage::Splitting => (50, 55),
        JobStage::StabilizingHead => (55, 70),
        JobStage::StabilizingTail => (70, 85),
        JobStage::Blending => (85, 90),
        JobStage::Assembling => (90, 100),
        JobStage::Done | JobStage::Failed => (100, 100),
    }
}

/// Per-job progress mapper with a monotonic clamp.
pub struct JobProgress {
    job_id: JobId,
    sink: Arc<dyn ProgressSink>,
    last: AtomicU8,
}

impl JobProgress {
    /// Create the mapper and emit the initial 0%.
    pub fn new(job_id: JobId, sink: Arc<dyn ProgressSink>) -> Self {
        sink.progress(&job_id, 0);
        Self {
            job_id,
            sink,
            last: AtomicU8::new(0),
        }
    }

    /// Report `fraction` (0.0-1.0) of the given stage's work.
    pub fn report(&self, stage: JobStage, fraction: f64) {
        let (start, end) = stage_window(stage);
        let span = (end - start) as f64;
        let value = start + (fraction.clamp(0.0, 1.0) * span).floor() as u8;
        self.emit(value.min(end));
    }

    /// Report job completion at 100%.
    pub fn finish(&self) {
        self.emit(100);
    }

    fn emit(&self, value: u8) {
        let prev = self.last.fetch_max(value, Ordering::SeqCst);
        if value > prev {
            self.sink.progress(&self.job_id, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CaptureSink {
        values: Mutex<Vec<u8>>,
    }

    impl ProgressSink for CaptureSink {
        fn progress(&self, _job: &JobId, percent: u8) {
            self.values.lock().unwrap().push(percent);
        }
    }

    fn harness() -> (Arc<CaptureSink>, JobProgress) {
        let sink = Arc::new(CaptureSink::default());
        let progress = JobProgress::new(JobId::new(), sink.clone());
        (sink, progress)
    }

    #[test]
    fn test_stage_windows_cover_zero_to_hundred() {
        assert_eq!(stage_window(JobStage::Sampling).0, 0);
        assert_eq!(stage_window(JobStage::Assembling).1, 100);

        // Consecutive stages tile the scale without gaps
        let order = [
            JobStage::Sampling,
            JobStage::Matching,
            JobStage::Splitting,
            JobStage::StabilizingHead,
            JobStage::StabilizingTail,
            JobStage::Blending,
            JobStage::Assembling,
        ];
        for pair in order.windows(2) {
            assert_eq!(stage_window(pair[0]).1, stage_window(pair[1]).0);
        }
    }

    #[test]
    fn test_reports_map_into_windows() {
        let (sink, progress) = harness();
        progress.report(JobStage::Sampling, 0.5);
        progress.report(JobStage::Matching, 0.5);
        progress.report(JobStage::Assembling, 1.0);

        let values = sink.values.lock().unwrap();
        assert_eq!(*values, vec![0, 12, 37, 100]);
    }

    #[test]
    fn test_monotonic_under_out_of_order_reports() {
        let (sink, progress) = harness();
        progress.report(JobStage::Matching, 1.0); // 50
        progress.report(JobStage::Sampling, 0.2); // would be 5, suppressed
        progress.report(JobStage::Matching, 0.1); // would be 27, suppressed
        progress.report(JobStage::Splitting, 0.0); // 50, not an increase
        progress.report(JobStage::Assembling, 0.5); // 95

        let values = sink.values.lock().unwrap();
        assert_eq!(*values, vec![0, 50, 95]);
        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_skipped_stages_collapse() {
        let (sink, progress) = harness();
        // CutOnly shape: straight from splitting to assembling
        progress.report(JobStage::Splitting, 1.0); // 55
        progress.report(JobStage::Assembling, 0.0); // 90
        progress.finish(); // 100

        let values = sink.values.lock().unwrap();
        assert_eq!(*values, vec![0, 55, 90, 100]);
    }

    #[test]
    fn test_fraction_clamped() {
        let (sink, progress) = harness();
        progress.report(JobStage::Sampling, 7.5);
        assert_eq!(*sink.values.lock().unwrap(), vec![0, 25]);
    }
}
