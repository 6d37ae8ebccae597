//! Job-scoped temporary workspace.
//!
//! Every intermediate artifact gets an explicitly-owned, always-initialized
//! path recorded at workspace creation, so the cleanup path never has to
//! reconstruct names from branch-local state. The directory and everything
//! in it are removed on every exit path; removal failures are logged, never
//! escalated.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::warn;

/// Temporary directory owning all of a job's intermediate files.
pub struct JobWorkspace {
    dir: TempDir,
    /// Extracted tail segment (plays first).
    pub tail: PathBuf,
    /// Extracted head segment (plays second).
    pub head: PathBuf,
    /// Stabilized tail segment, when stabilization runs.
    pub tail_stabilized: PathBuf,
    /// Stabilized head segment, when stabilization runs.
    pub head_stabilized: PathBuf,
    /// Synthesized cross-dissolve clip, when blending runs.
    pub transition: PathBuf,
    /// Concat-demuxer list file.
    pub concat_list: PathBuf,
    /// Assembled output, moved to the caller's path only on full success.
    pub output: PathBuf,
}

impl JobWorkspace {
    /// Create a fresh workspace under `work_dir` (or the system temp dir).
    pub fn create(work_dir: Option<&Path>) -> std::io::Result<Self> {
        let dir = match work_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                TempDir::with_prefix_in("loopfix-job-", parent)?
            }
            None => TempDir::with_prefix("loopfix-job-")?,
        };

        let p = |name: &str| dir.path().join(name);
        Ok(Self {
            tail: p("tail.mp4"),
            head: p("head.mp4"),
            tail_stabilized: p("tail_stabilized.mp4"),
            head_stabilized: p("head_stabilized.mp4"),
            transition: p("transition.mp4"),
            concat_list: p("concat.txt"),
            output: p("output.mp4"),
            dir,
        })
    }

    /// Workspace directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the workspace, logging (but not propagating) failures.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove job workspace {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_paths_live_under_workspace() {
        let ws = JobWorkspace::create(None).unwrap();
        let root = ws.path().to_path_buf();
        for artifact in [
            &ws.tail,
            &ws.head,
            &ws.tail_stabilized,
            &ws.head_stabilized,
            &ws.transition,
            &ws.concat_list,
            &ws.output,
        ] {
            assert!(artifact.starts_with(&root));
        }
        assert!(root.exists());
        ws.close();
        assert!(!root.exists());
    }

    #[test]
    fn test_close_removes_contents() {
        let ws = JobWorkspace::create(None).unwrap();
        std::fs::write(&ws.tail, b"segment").unwrap();
        std::fs::write(&ws.concat_list, b"file 'tail.mp4'").unwrap();
        let root = ws.path().to_path_buf();
        ws.close();
        assert!(!root.exists());
    }

    #[test]
    fn test_create_under_configured_work_dir() {
        let parent = TempDir::new().unwrap();
        let ws = JobWorkspace::create(Some(parent.path())).unwrap();
        assert!(ws.path().starts_with(parent.path()));
        ws.close();
    }
}
