//! Pipeline error types.

use thiserror::Error;

use loopfix_media::MediaError;
use loopfix_models::InvalidJob;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Fatal job errors, propagated to the caller via the error signal.
///
/// Per-frame stabilization failures are not errors; they degrade to
/// pass-through frames and are logged by the stabilizer.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid job request: {0}")]
    InvalidRequest(#[from] InvalidJob),

    #[error("failed to decode source video: {0}")]
    Decode(#[source] MediaError),

    #[error(
        "video too short for seam search: {duration:.1}s available, at least {required:.1}s required"
    )]
    InsufficientDuration { duration: f64, required: f64 },

    #[error("segment extraction failed: {0}")]
    SegmentExtraction(#[source] MediaError),

    #[error("output encoding failed: {0}")]
    Encode(#[source] MediaError),

    #[error("job cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable kind string for the caller-facing error signal.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidRequest(_) => "invalid_request",
            PipelineError::Decode(_) => "decode",
            PipelineError::InsufficientDuration { .. } => "insufficient_duration",
            PipelineError::SegmentExtraction(_) => "segment_extraction",
            PipelineError::Encode(_) => "encode",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Io(_) => "io",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }

    /// Map a media error raised while reading the source.
    pub(crate) fn decode(e: MediaError) -> Self {
        if e.is_cancelled() {
            PipelineError::Cancelled
        } else {
            PipelineError::Decode(e)
        }
    }

    /// Map a media error raised while materializing a segment.
    pub(crate) fn extraction(e: MediaError) -> Self {
        if e.is_cancelled() {
            PipelineError::Cancelled
        } else {
            PipelineError::SegmentExtraction(e)
        }
    }

    /// Map a media error raised while producing output video.
    pub(crate) fn encode(e: MediaError) -> Self {
        if e.is_cancelled() {
            PipelineError::Cancelled
        } else {
            PipelineError::Encode(e)
        }
    }
}
