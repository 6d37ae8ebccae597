//! Worker configuration.

use std::path::PathBuf;

/// Worker configuration.
///
/// No internal job timeout is imposed; callers wanting bounded latency
/// cancel through the registry.
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Parent directory for job workspaces; system temp when unset
    pub work_dir: Option<PathBuf>,
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("LOOPFIX_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            work_dir: std::env::var("LOOPFIX_WORK_DIR").ok().map(PathBuf::from),
        }
    }

    /// Concurrency cap, never zero.
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_jobs.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_never_zero() {
        let config = WorkerConfig {
            max_concurrent_jobs: 0,
            work_dir: None,
        };
        assert_eq!(config.concurrency(), 1);
    }
}
