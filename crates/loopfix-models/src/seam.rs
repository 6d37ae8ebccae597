//! Seam candidates and video segments.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The winning pair of near-duplicate frames from the similarity search.
///
/// Positions are sampled-frame indices; convert back to the source timeline
/// with [`SeamCandidate::timestamps`] before cutting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeamCandidate {
    /// Earlier sampled-frame index.
    pub position_a: usize,
    /// Later sampled-frame index.
    pub position_b: usize,
    /// Blended similarity score, higher is more similar.
    pub score: f64,
}

impl SeamCandidate {
    /// Gap between the two positions, in sampled frames.
    pub fn gap(&self) -> usize {
        self.position_b - self.position_a
    }

    /// Map both positions back to source-timeline seconds.
    pub fn timestamps(&self, sample_stride: usize, source_fps: f64) -> (f64, f64) {
        let to_secs = |pos: usize| (pos * sample_stride) as f64 / source_fps;
        (to_secs(self.position_a), to_secs(self.position_b))
    }
}

/// A logical sub-range of a source video, materialized by segment extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoSegment {
    /// Source file the range refers to.
    pub source: PathBuf,
    /// Range start, in seconds.
    pub start_secs: f64,
    /// Range end, in seconds.
    pub end_secs: f64,
}

impl VideoSegment {
    pub fn new(source: impl Into<PathBuf>, start_secs: f64, end_secs: f64) -> Self {
        Self {
            source: source.into(),
            start_secs,
            end_secs,
        }
    }

    /// Segment length in seconds.
    pub fn duration(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

/// Split a usable range `[start, end]` at its midpoint into (tail, head).
///
/// The tail covers the second half and plays first in the reassembled
/// output; the head covers the first half and plays second. This places the
/// matched seam frames at the two ends of the output, where a loop needs
/// them to be similar.
pub fn split_at_midpoint(
    source: impl Into<PathBuf>,
    start_secs: f64,
    end_secs: f64,
) -> (VideoSegment, VideoSegment) {
    let source = source.into();
    let midpoint = start_secs + (end_secs - start_secs) / 2.0;
    let tail = VideoSegment::new(source.clone(), midpoint, end_secs);
    let head = VideoSegment::new(source, start_secs, midpoint);
    (tail, head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_timestamps() {
        let seam = SeamCandidate {
            position_a: 12,
            position_b: 90,
            score: 0.97,
        };
        assert_eq!(seam.gap(), 78);

        // 12 sampled frames at stride 5 over 30 fps => 2 seconds
        let (ta, tb) = seam.timestamps(5, 30.0);
        assert!((ta - 2.0).abs() < 1e-9);
        assert!((tb - 15.0).abs() < 1e-9);
        assert!(ta < tb);
    }

    #[test]
    fn test_split_at_midpoint() {
        let (tail, head) = split_at_midpoint("clip.mp4", 2.0, 14.0);
        assert_eq!(head.start_secs, 2.0);
        assert_eq!(head.end_secs, 8.0);
        assert_eq!(tail.start_secs, 8.0);
        assert_eq!(tail.end_secs, 14.0);
        assert!((tail.duration() + head.duration() - 12.0).abs() < 1e-9);
    }
}
