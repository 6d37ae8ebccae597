//! Loop-repair worker binary.
//!
//! Reads a JSON array of job requests, runs them concurrently through the
//! registry, and prints one JSON report per job. Ctrl-C cancels every
//! in-flight job cooperatively; cancelled jobs still clean up their
//! workspaces and publish nothing.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use loopfix_models::{JobId, JobRequest, JobState};
use loopfix_worker::{JobRegistry, ProgressSink, WorkerConfig};

/// Sink that forwards job events to the log.
struct LogSink;

impl ProgressSink for LogSink {
    fn progress(&self, job: &JobId, percent: u8) {
        info!(job_id = %job, percent, "progress");
    }

    fn completed(&self, job: &JobId, output: &Path) {
        info!(job_id = %job, output = %output.display(), "completed");
    }

    fn failed(&self, job: &JobId, kind: &str, message: &str) {
        error!(job_id = %job, kind, "failed: {}", message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("loopfix=info".parse().expect("valid directive"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let jobs_path = std::env::args()
        .nth(1)
        .context("usage: loopfix-worker <jobs.json>")?;
    let data = std::fs::read_to_string(&jobs_path)
        .with_context(|| format!("failed to read job list {}", jobs_path))?;
    let requests: Vec<JobRequest> =
        serde_json::from_str(&data).context("failed to parse job list")?;
    if requests.is_empty() {
        bail!("job list is empty");
    }

    let config = WorkerConfig::from_env();
    info!("Starting loopfix-worker: {:?}", config);

    let registry = Arc::new(JobRegistry::new(config, Arc::new(LogSink)));

    // Ctrl-C cancels all jobs cooperatively
    let shutdown_registry = Arc::clone(&registry);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling jobs");
            shutdown_registry.cancel_all();
        }
    });

    let ids: Vec<JobId> = requests
        .into_iter()
        .map(|request| registry.spawn(request))
        .collect();
    let total = ids.len();

    let mut failed = 0usize;
    for id in &ids {
        if let Some(report) = registry.join(id).await {
            if report.state != JobState::Completed {
                failed += 1;
            }
            println!("{}", serde_json::to_string(&report)?);
        }
    }

    if failed > 0 {
        bail!("{failed} of {total} jobs failed");
    }
    info!("All {} jobs completed", total);
    Ok(())
}
