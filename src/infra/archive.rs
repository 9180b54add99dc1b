//! Tarball packing and unpacking
//!
//! Publish attachments are base64-encoded gzipped tarballs with a top-level
//! `package/` directory. Both directions run on the blocking thread pool.

use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::PrepareError;

/// Top-level directory inside npm tarballs
pub const PACKAGE_DIR: &str = "package";

/// Decode a base64 tarball and extract it into `dest`
pub async fn unpack_base64(content: &str, dest: &Path) -> Result<(), PrepareError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(content.trim())
        .map_err(|e| PrepareError::Decode {
            error: e.to_string(),
        })?;

    if bytes.is_empty() {
        return Err(PrepareError::Decode {
            error: "package content is empty".to_string(),
        });
    }

    let dest = dest.to_path_buf();
    run_blocking(dest.clone(), move || unpack_bytes(&bytes, &dest)).await
}

/// Gzip and tar `src_dir` into `dest` under a `package/` prefix
pub async fn pack_dir(src_dir: &Path, dest: &Path) -> Result<(), PrepareError> {
    let src_dir = src_dir.to_path_buf();
    let dest = dest.to_path_buf();
    run_blocking(dest.clone(), move || pack(&src_dir, &dest)).await
}

fn unpack_bytes(bytes: &[u8], dest: &Path) -> Result<(), PrepareError> {
    std::fs::create_dir_all(dest).map_err(|e| PrepareError::Io {
        path: dest.to_path_buf(),
        error: e.to_string(),
    })?;

    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    archive.unpack(dest).map_err(|e| PrepareError::Archive {
        path: dest.to_path_buf(),
        error: e.to_string(),
    })
}

fn pack(src_dir: &Path, dest: &Path) -> Result<(), PrepareError> {
    let archive_error = |e: std::io::Error| PrepareError::Archive {
        path: dest.to_path_buf(),
        error: e.to_string(),
    };

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PrepareError::Io {
            path: parent.to_path_buf(),
            error: e.to_string(),
        })?;
    }

    let file = File::create(dest).map_err(|e| PrepareError::Io {
        path: dest.to_path_buf(),
        error: e.to_string(),
    })?;

    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder
        .append_dir_all(PACKAGE_DIR, src_dir)
        .map_err(archive_error)?;
    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .map_err(archive_error)?;
    Ok(())
}

async fn run_blocking<F>(path: PathBuf, task: F) -> Result<(), PrepareError>
where
    F: FnOnce() -> Result<(), PrepareError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| PrepareError::Archive {
            path,
            error: e.to_string(),
        })?
}
