//! Filesystem helpers shared across modules.
//!
//! These helpers provide consistent error context (operation + path) for
//! the working-directory bookkeeping done by the job runner.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: io::Error) -> Error {
    Error::io_path(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error(op, path, e))
}

/// Ensure a directory exists (synchronous variant) with a custom operation label.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Recursively delete a directory, treating "already gone" as success.
///
/// Failures are logged, not returned: callers use this on teardown paths
/// where the job outcome is already decided.
pub async fn remove_dir_all_quiet(path: &Path) -> bool {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed directory");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove directory");
            false
        }
    }
}

/// List the regular, non-hidden files directly inside `dir`, sorted by name.
pub async fn list_visible_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| io_error("listing directory", dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| io_error("listing directory", dir, e))?
    {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Move `src` to `dest`, falling back to copy + remove when a plain rename
/// is not possible (e.g. across filesystems).
pub async fn move_file(src: &Path, dest: &Path) -> Result<()> {
    match tokio::fs::rename(src, dest).await {
        Ok(()) => return Ok(()),
        Err(e) => {
            debug!(
                src = %src.display(),
                dest = %dest.display(),
                error = %e,
                "Rename failed, falling back to copy"
            );
        }
    }

    if let Err(e) = tokio::fs::copy(src, dest).await {
        // Don't leave a truncated copy behind.
        let _ = tokio::fs::remove_file(dest).await;
        return Err(io_error("copying file to", dest, e));
    }
    tokio::fs::remove_file(src)
        .await
        .map_err(|e| io_error("removing moved file", src, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ensure_dir_creates_nested_directories() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_dir_all_with_op("creating directory", &nested)
            .await
            .unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_list_visible_files_skips_hidden_and_dirs() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("b.mp4"), b"x").unwrap();
        std::fs::write(temp.path().join("a.webm"), b"x").unwrap();
        std::fs::write(temp.path().join(".hidden"), b"x").unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();

        let files = list_visible_files(temp.path()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.webm", "b.mp4"]);
    }

    #[tokio::test]
    async fn test_move_file() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src.bin");
        let dest = temp.path().join("dest.bin");
        std::fs::write(&src, b"payload").unwrap();

        move_file(&src, &dest).await.unwrap();
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_remove_dir_all_quiet_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(remove_dir_all_quiet(&temp.path().join("missing")).await);
    }
}
