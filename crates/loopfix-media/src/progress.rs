//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information from FFmpeg.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Output time as string (HH:MM:SS.microseconds)
    pub out_time: String,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fraction of the work done given the total duration in milliseconds.
    pub fn fraction(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        (self.out_time_ms as f64 / total_duration_ms as f64).min(1.0)
    }

    /// Progress percentage given the total duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        self.fraction(total_duration_ms) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percentage() {
        let progress = FfmpegProgress {
            out_time_ms: 5000,
            ..Default::default()
        };

        assert!((progress.percentage(10000) - 50.0).abs() < 0.01);
        assert!((progress.percentage(5000) - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_fraction_clamps() {
        let progress = FfmpegProgress {
            out_time_ms: 20000,
            ..Default::default()
        };

        assert!((progress.fraction(10000) - 1.0).abs() < f64::EPSILON);
        assert_eq!(progress.fraction(0), 0.0);
    }
}
