//! Job registry.
//!
//! Jobs are keyed by id; each entry owns the job's cancellation handle and
//! a completion channel the worker task reports through. Workers are never
//! polled or mutated from outside; completion arrives by message passing.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{oneshot, watch, Semaphore};
use tracing::info;

use loopfix_models::{JobId, JobReport, JobRequest, JobState};

use crate::config::WorkerConfig;
use crate::pipeline;
use crate::progress::{JobProgress, ProgressSink};

struct JobHandle {
    cancel_tx: watch::Sender<bool>,
    done_rx: oneshot::Receiver<JobReport>,
    started_at: DateTime<Utc>,
}

/// Registry of live jobs, owned by the caller.
///
/// The progress sink is shared across jobs and must be safe for concurrent
/// use; jobs themselves share no mutable state.
pub struct JobRegistry {
    config: WorkerConfig,
    sink: Arc<dyn ProgressSink>,
    semaphore: Arc<Semaphore>,
    jobs: Mutex<HashMap<JobId, JobHandle>>,
}

impl JobRegistry {
    /// Create a registry with the given config and shared progress sink.
    pub fn new(config: WorkerConfig, sink: Arc<dyn ProgressSink>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency()));
        Self {
            config,
            sink,
            semaphore,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Spawn a job on its own worker task and register it.
    pub fn spawn(&self, request: JobRequest) -> JobId {
        let job_id = JobId::new();
        let started_at = Utc::now();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = oneshot::channel();

        let config = self.config.clone();
        let sink = Arc::clone(&self.sink);
        let semaphore = Arc::clone(&self.semaphore);
        let task_job_id = job_id.clone();

        tokio::spawn(async move {
            // Bound concurrent jobs; a closed semaphore cannot happen while
            // the registry is alive, but degrade to running unbounded rather
            // than dropping the job if it ever does.
            let _permit = semaphore.acquire_owned().await.ok();

            let progress = Arc::new(JobProgress::new(task_job_id.clone(), Arc::clone(&sink)));
            let result =
                pipeline::run_job(&request, &task_job_id, &config, &progress, cancel_rx).await;

            let report = match result {
                Ok(output) => {
                    sink.completed(&task_job_id, &output);
                    JobReport::completed(task_job_id.clone(), output, started_at)
                }
                Err(e) => {
                    let state = if e.is_cancelled() {
                        JobState::Cancelled
                    } else {
                        JobState::Failed
                    };
                    sink.failed(&task_job_id, e.kind(), &e.to_string());
                    JobReport::failed(task_job_id.clone(), state, e.to_string(), started_at)
                }
            };
            let _ = done_tx.send(report);
        });

        info!(job_id = %job_id, "Job registered");
        self.jobs.lock().expect("registry lock").insert(
            job_id.clone(),
            JobHandle {
                cancel_tx,
                done_rx,
                started_at,
            },
        );
        job_id
    }

    /// Request cooperative cancellation of a job. Returns false for unknown
    /// ids.
    pub fn cancel(&self, id: &JobId) -> bool {
        let jobs = self.jobs.lock().expect("registry lock");
        match jobs.get(id) {
            Some(handle) => {
                info!(job_id = %id, "Cancellation requested");
                handle.cancel_tx.send(true).is_ok()
            }
            None => false,
        }
    }

    /// Request cancellation of every registered job.
    pub fn cancel_all(&self) {
        let jobs = self.jobs.lock().expect("registry lock");
        for (id, handle) in jobs.iter() {
            info!(job_id = %id, "Cancellation requested");
            let _ = handle.cancel_tx.send(true);
        }
    }

    /// Wait for a job's completion report, removing it from the registry.
    /// Returns `None` for unknown ids.
    pub async fn join(&self, id: &JobId) -> Option<JobReport> {
        let handle = self.jobs.lock().expect("registry lock").remove(id)?;
        match handle.done_rx.await {
            Ok(report) => Some(report),
            // The worker task died without reporting; surface that as a failure
            Err(_) => Some(JobReport::failed(
                id.clone(),
                JobState::Failed,
                "worker task dropped without reporting".to_string(),
                handle.started_at,
            )),
        }
    }

    /// Ids of all registered (not yet joined) jobs.
    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs
            .lock()
            .expect("registry lock")
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        completed: AtomicUsize,
        failed: AtomicUsize,
    }

    impl ProgressSink for CountingSink {
        fn progress(&self, _job: &JobId, _percent: u8) {}
        fn completed(&self, _job: &JobId, _output: &Path) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn failed(&self, _job: &JobId, _kind: &str, _message: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_invalid_job_reports_failure() {
        let sink = Arc::new(CountingSink::default());
        let registry = JobRegistry::new(WorkerConfig::default(), sink.clone());

        let request = JobRequest::new("in.mp4", "out.mp4").with_min_gap(-1.0);
        let id = registry.spawn(request);

        let report = registry.join(&id).await.unwrap();
        assert_eq!(report.state, JobState::Failed);
        assert!(report.error.unwrap().contains("min_gap_seconds"));
        assert_eq!(sink.failed.load(Ordering::SeqCst), 1);
        assert_eq!(sink.completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_join_removes_job() {
        let registry = JobRegistry::new(
            WorkerConfig::default(),
            Arc::new(CountingSink::default()),
        );
        let id = registry.spawn(JobRequest::new("in.mp4", "out.mp4").with_min_gap(0.0));
        assert_eq!(registry.job_ids().len(), 1);

        registry.join(&id).await.unwrap();
        assert!(registry.job_ids().is_empty());
        assert!(registry.join(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let registry = JobRegistry::new(
            WorkerConfig::default(),
            Arc::new(CountingSink::default()),
        );
        assert!(!registry.cancel(&JobId::new()));
    }
}
