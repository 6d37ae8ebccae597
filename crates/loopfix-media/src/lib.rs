#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper and frame analysis for the loopfix pipeline.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation support via tokio
//! - Probing, sub-clip extraction, rawvideo decode/encode pipes
//! - Seam search (frame sampling + similarity scoring)
//! - Motion-compensated stabilization
//! - Cross-dissolve seam blending and concat assembly

pub mod blend;
pub mod clip;
pub mod command;
pub mod concat;
pub mod decode;
pub mod encode;
pub mod error;
pub mod frame;
pub mod fs_utils;
pub mod probe;
pub mod progress;
pub mod sampler;
pub mod similarity;
pub mod stabilize;

pub use blend::cross_dissolve;
pub use clip::extract_segment;
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::{assemble, AssembleMode};
pub use decode::{first_frame, last_frame, PixelFormat, RawVideoStream};
pub use encode::RawFrameSink;
pub use error::{MediaError, MediaResult};
pub use frame::GrayFrame;
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use sampler::{min_gap_frames, SampledFrames, SAMPLE_STRIDE};
pub use similarity::{find_seam, similarity_score};
pub use stabilize::{stabilize_segment, StabilizeReport};
