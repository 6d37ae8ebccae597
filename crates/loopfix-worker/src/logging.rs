//! Structured job logging utilities.

use tracing::{error, info, warn, Span};

use loopfix_models::{JobId, JobStage};

/// Job logger with consistent, structured formatting for lifecycle events.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
}

impl JobLogger {
    /// Create a new job logger.
    pub fn new(job_id: &JobId) -> Self {
        Self {
            job_id: job_id.to_string(),
        }
    }

    /// Log the start of a job.
    pub fn log_start(&self, message: &str) {
        info!(job_id = %self.job_id, "Job started: {}", message);
    }

    /// Log entry into a pipeline stage.
    pub fn log_stage(&self, stage: JobStage, message: &str) {
        info!(job_id = %self.job_id, stage = %stage, "{}", message);
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(job_id = %self.job_id, "Job warning: {}", message);
    }

    /// Log an error during job execution.
    pub fn log_error(&self, message: &str) {
        error!(job_id = %self.job_id, "Job error: {}", message);
    }

    /// Log the completion of a job.
    pub fn log_completion(&self, message: &str) {
        info!(job_id = %self.job_id, "Job completed: {}", message);
    }

    /// Get the job ID.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id);
        assert_eq!(logger.job_id(), job_id.to_string());
    }
}
