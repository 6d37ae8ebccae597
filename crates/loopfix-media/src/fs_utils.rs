//! Filesystem utilities for publishing outputs.
//!
//! The pipeline writes its result inside the job workspace and only moves
//! it to the caller's output path on full success, so a failed or cancelled
//! job never leaves a partial file behind.

use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Move a file from `src` to `dst`, handling cross-device moves.
///
/// Attempts a fast rename first; on EXDEV (the workspace and the output
/// live on different filesystems) falls back to copying to a temp file next
/// to `dst` and renaming it into place, so the destination appears
/// atomically.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device_error(&e) => {
            tracing::debug!(
                "Cross-device rename detected, falling back to copy+delete: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(MediaError::from(e)),
    }
}

/// Check if an IO error is EXDEV (cross-device link).
fn is_cross_device_error(e: &std::io::Error) -> bool {
    // EXDEV is error code 18 on Linux/macOS
    e.raw_os_error() == Some(18)
}

/// Copy file to destination (via temp file) then delete source.
async fn copy_and_delete(src: &Path, dst: &Path) -> MediaResult<()> {
    let tmp_dst = dst.with_extension("tmp");

    fs::copy(src, &tmp_dst).await?;

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = std::fs::remove_file(&tmp_dst);
        return Err(MediaError::from(e));
    }

    // Delete source (best effort)
    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!(
            "Failed to remove source file after cross-device move: {}: {}",
            src.display(),
            e
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_file_same_filesystem() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("dest.mp4");

        fs::write(&src, b"video bytes").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists(), "Source file should be removed");
        assert!(dst.exists(), "Destination file should exist");
        assert_eq!(fs::read(&dst).await.unwrap(), b"video bytes");
    }

    #[tokio::test]
    async fn test_move_file_to_subdirectory() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("out").join("dest.mp4");

        fs::write(&src, b"video bytes").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert!(dst.exists());
    }

    #[tokio::test]
    async fn test_move_file_overwrites_destination() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.mp4");
        let dst = dir.path().join("dest.mp4");

        fs::write(&src, b"new").await.unwrap();
        fs::write(&dst, b"old").await.unwrap();

        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_is_cross_device_error() {
        let exdev_error = std::io::Error::from_raw_os_error(18);
        assert!(is_cross_device_error(&exdev_error));

        let not_found = std::io::Error::from_raw_os_error(2);
        assert!(!is_cross_device_error(&not_found));
    }
}
