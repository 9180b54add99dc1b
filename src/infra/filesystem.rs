//! Filesystem operations
//!
//! Async directory helpers used by the working-path lifecycle and the purge
//! janitor.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub async fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| FilesystemError::CreateDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
}

/// Remove a file or a directory tree
///
/// A path that does not exist is not an error.
pub async fn remove_path(path: &Path) -> Result<(), FilesystemError> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(FilesystemError::Remove {
                path: path.to_path_buf(),
                error: e.to_string(),
            })
        }
    };

    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FilesystemError::Remove {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}

/// List a directory's entries with their modification times
///
/// Entries whose metadata cannot be read are skipped.
pub async fn list_with_mtime(dir: &Path) -> Result<Vec<(PathBuf, SystemTime)>, FilesystemError> {
    let read_dir_error = |e: std::io::Error| FilesystemError::ReadDir {
        path: dir.to_path_buf(),
        error: e.to_string(),
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(read_dir_error)?;
    let mut listed = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(read_dir_error)? {
        let path = entry.path();
        match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(mtime) => listed.push((path, mtime)),
            Err(e) => tracing::debug!("Skipping {}: {}", path.display(), e),
        }
    }

    Ok(listed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_dir_all_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        create_dir_all(&nested).await.unwrap();
        create_dir_all(&nested).await.unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_remove_path_handles_files_dirs_and_missing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("dir");
        std::fs::create_dir_all(dir.join("inner")).unwrap();
        std::fs::write(dir.join("inner").join("f.txt"), "x").unwrap();
        let file = temp.path().join("file.tgz");
        std::fs::write(&file, "x").unwrap();

        remove_path(&dir).await.unwrap();
        remove_path(&file).await.unwrap();
        remove_path(&temp.path().join("missing")).await.unwrap();

        assert!(!dir.exists());
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_list_with_mtime() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a"), "x").unwrap();
        std::fs::create_dir(temp.path().join("b")).unwrap();

        let mut names: Vec<String> = list_with_mtime(temp.path())
            .await
            .unwrap()
            .into_iter()
            .filter_map(|(p, _)| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_error() {
        let temp = TempDir::new().unwrap();
        let result = list_with_mtime(&temp.path().join("nope")).await;
        assert!(matches!(result, Err(FilesystemError::ReadDir { .. })));
    }
}
