//! Shared data models for the loopfix pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Job requests, identifiers, and lifecycle reports
//! - The pipeline shape and stage state machine
//! - Seam candidates and video segments
//! - Encoding configuration

pub mod encoding;
pub mod job;
pub mod seam;

// Re-export common types
pub use encoding::EncodingConfig;
pub use job::{InvalidJob, JobId, JobReport, JobRequest, JobStage, JobState, PipelineShape};
pub use seam::{split_at_midpoint, SeamCandidate, VideoSegment};
