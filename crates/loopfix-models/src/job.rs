//! Job definitions for the loop-repair pipeline.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Smallest allowed cross-dissolve length, in frames.
pub const MIN_TRANSITION_FRAMES: u32 = 2;
/// Largest allowed cross-dissolve length, in frames.
pub const MAX_TRANSITION_FRAMES: u32 = 60;

fn default_transition_frames() -> u32 {
    6
}

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request to repair one video for seamless looping.
///
/// Consumed entirely by a single pipeline run; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobRequest {
    /// Source video file.
    pub input_path: PathBuf,

    /// Where the repaired video is published on success.
    pub output_path: PathBuf,

    /// Minimum separation, in seconds, between the two seam frames.
    pub min_gap_seconds: f64,

    /// Remove residual camera shake from each segment.
    #[serde(default)]
    pub stabilize: bool,

    /// Hide the interior seam behind a short cross-dissolve.
    #[serde(default)]
    pub use_transition: bool,

    /// Length of the cross-dissolve, in frames.
    #[serde(default = "default_transition_frames")]
    pub transition_frame_count: u32,
}

/// Reasons a [`JobRequest`] is rejected before any work starts.
#[derive(Debug, Error, PartialEq)]
pub enum InvalidJob {
    #[error("min_gap_seconds must be positive, got {0}")]
    NonPositiveGap(f64),

    #[error("transition_frame_count must be in [2, 60], got {0}")]
    TransitionFrameCount(u32),

    #[error("input and output paths must differ")]
    InputIsOutput,
}

impl JobRequest {
    /// Create a request with default options (no stabilization, no transition).
    pub fn new(input_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            min_gap_seconds: 10.0,
            stabilize: false,
            use_transition: false,
            transition_frame_count: default_transition_frames(),
        }
    }

    /// Set the minimum seam gap.
    pub fn with_min_gap(mut self, seconds: f64) -> Self {
        self.min_gap_seconds = seconds;
        self
    }

    /// Enable motion stabilization of both segments.
    pub fn with_stabilize(mut self) -> Self {
        self.stabilize = true;
        self
    }

    /// Enable the cross-dissolve transition.
    pub fn with_transition(mut self, frames: u32) -> Self {
        self.use_transition = true;
        self.transition_frame_count = frames;
        self
    }

    /// Check the request against the form limits.
    pub fn validate(&self) -> Result<(), InvalidJob> {
        if !(self.min_gap_seconds > 0.0) {
            return Err(InvalidJob::NonPositiveGap(self.min_gap_seconds));
        }
        if self.use_transition
            && !(MIN_TRANSITION_FRAMES..=MAX_TRANSITION_FRAMES)
                .contains(&self.transition_frame_count)
        {
            return Err(InvalidJob::TransitionFrameCount(self.transition_frame_count));
        }
        if self.input_path == self.output_path {
            return Err(InvalidJob::InputIsOutput);
        }
        Ok(())
    }

    /// The pipeline shape selected by the option flags.
    pub fn shape(&self) -> PipelineShape {
        PipelineShape::from_flags(self.stabilize, self.use_transition)
    }
}

/// The four valid pipeline shapes, one per combination of option flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineShape {
    /// Cut and reorder only.
    CutOnly,
    /// Cut, stabilize both segments, reorder.
    Stabilized,
    /// Cut, reorder, cross-dissolve over the interior seam.
    Blended,
    /// Stabilize and cross-dissolve.
    StabilizedBlended,
}

impl PipelineShape {
    /// Derive the shape from the two option flags.
    pub fn from_flags(stabilize: bool, use_transition: bool) -> Self {
        match (stabilize, use_transition) {
            (false, false) => PipelineShape::CutOnly,
            (true, false) => PipelineShape::Stabilized,
            (false, true) => PipelineShape::Blended,
            (true, true) => PipelineShape::StabilizedBlended,
        }
    }

    /// Whether this shape runs the stabilization stages.
    pub fn stabilizes(&self) -> bool {
        matches!(self, PipelineShape::Stabilized | PipelineShape::StabilizedBlended)
    }

    /// Whether this shape runs the blending stage.
    pub fn blends(&self) -> bool {
        matches!(self, PipelineShape::Blended | PipelineShape::StabilizedBlended)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineShape::CutOnly => "cut_only",
            PipelineShape::Stabilized => "stabilized",
            PipelineShape::Blended => "blended",
            PipelineShape::StabilizedBlended => "stabilized_blended",
        }
    }
}

impl fmt::Display for PipelineShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stages a job moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Idle,
    Sampling,
    Matching,
    Splitting,
    StabilizingHead,
    StabilizingTail,
    Blending,
    Assembling,
    Done,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Idle => "idle",
            JobStage::Sampling => "sampling",
            JobStage::Matching => "matching",
            JobStage::Splitting => "splitting",
            JobStage::StabilizingHead => "stabilizing_head",
            JobStage::StabilizingTail => "stabilizing_tail",
            JobStage::Blending => "blending",
            JobStage::Assembling => "assembling",
            JobStage::Done => "done",
            JobStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Done | JobStage::Failed)
    }

    /// Whether this stage executes for the given pipeline shape.
    pub fn runs_for(&self, shape: PipelineShape) -> bool {
        match self {
            JobStage::StabilizingHead | JobStage::StabilizingTail => shape.stabilizes(),
            JobStage::Blending => shape.blends(),
            _ => true,
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle state, as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// Summary of a finished (or failed) job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobReport {
    pub id: JobId,
    pub state: JobState,

    /// Published output path, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Error description, present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    /// Report a successful job.
    pub fn completed(id: JobId, output: PathBuf, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            state: JobState::Completed,
            output: Some(output),
            error: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Report a failed or cancelled job.
    pub fn failed(id: JobId, state: JobState, error: String, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            state,
            output: None,
            error: Some(error),
            started_at,
            finished_at: Utc::now(),
        }
    }
}
