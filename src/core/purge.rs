//! Stale working directory purge
//!
//! Workers create one directory per dispatch id under the target root.
//! Entries whose name is a v4 UUID and whose modification time is older
//! than the purge age are removed.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use crate::error::FilesystemError;
use crate::infra::filesystem;

fn dispatch_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)^[0-9A-F]{8}-[0-9A-F]{4}-4[0-9A-F]{3}-[89AB][0-9A-F]{3}-[0-9A-F]{12}$").ok()
        })
        .as_ref()
}

/// Whether `name` is a v4 UUID
pub fn is_dispatch_id(name: &str) -> bool {
    dispatch_id_pattern().is_some_and(|re| re.is_match(name))
}

/// Purge entries older than `max_age`; returns how many were removed
pub async fn purge(target: &Path, max_age: Duration) -> Result<usize, FilesystemError> {
    purge_at(target, max_age, SystemTime::now()).await
}

/// [`purge`] against an explicit clock
pub async fn purge_at(
    target: &Path,
    max_age: Duration,
    now: SystemTime,
) -> Result<usize, FilesystemError> {
    let entries = filesystem::list_with_mtime(target).await?;
    let mut removed = 0;

    for (path, mtime) in entries {
        let is_candidate = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_dispatch_id);
        if !is_candidate {
            continue;
        }

        // future mtimes count as fresh
        let age = now.duration_since(mtime).unwrap_or(Duration::ZERO);
        if age <= max_age {
            tracing::info!("Skip purge of file: {}", path.display());
            continue;
        }

        tracing::info!("Purge outdated file: {}", path.display());
        match filesystem::remove_path(&path).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::error!("{}", e),
        }
    }

    tracing::info!(
        "Purged {} outdated files from temporary target location",
        removed
    );
    Ok(removed)
}
