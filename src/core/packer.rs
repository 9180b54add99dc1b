//! Artifact preparation
//!
//! Produces a build-ready tarball for a spec. A tarball uploaded by an
//! earlier attempt is reused when object storage has it; otherwise the
//! published tarball is unpacked, its dependencies installed, and the result
//! repacked and uploaded for next time.

use std::path::PathBuf;
use std::sync::Arc;

use crate::core::spec::BuildSpec;
use crate::core::status::{StatusEvent, StatusWriter};
use crate::error::{InstallError, PrepareError, StorageError};
use crate::infra::archive;
use crate::infra::installer::{InstallRequest, Installer};
use crate::infra::retry::{retry, RetryPolicy};
use crate::infra::storage::ObjectStorage;
use crate::infra::workdir::WorkingPaths;

const INSTALL_ALL_KEY: &str = "npm install-all";
const INSTALL_KEY: &str = "npm install";
const UNPACK_KEY: &str = "unpacking";
const PACK_KEY: &str = "packing";
const DOWNLOAD_KEY: &str = "downloading";

/// Download-or-repack pipeline
pub struct ArtifactPreparer {
    storage: Option<Arc<dyn ObjectStorage>>,
    installer: Arc<dyn Installer>,
    retry: RetryPolicy,
    install_root: PathBuf,
    tarball_root: PathBuf,
}

impl ArtifactPreparer {
    /// Create a preparer writing under the given roots
    pub fn new(
        installer: Arc<dyn Installer>,
        retry: RetryPolicy,
        install_root: PathBuf,
        tarball_root: PathBuf,
    ) -> Self {
        Self {
            storage: None,
            installer,
            retry,
            install_root,
            tarball_root,
        }
    }

    /// Reuse and upload tarballs through `storage`
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Prepare a tarball for `spec` from base64 `content`
    ///
    /// On failure the working paths are already removed.
    pub async fn prepare(
        &self,
        spec: &BuildSpec,
        content: &str,
        status: &StatusWriter,
    ) -> Result<WorkingPaths, PrepareError> {
        tracing::info!(name = %spec.name, version = %spec.version, "Preparing build for all locales");

        let paths =
            WorkingPaths::allocate(&self.install_root, &self.tarball_root, &spec.path_stem()).await?;

        match self.fill(spec, content, &paths, status).await {
            Ok(()) => Ok(paths),
            Err(e) => {
                let _ = paths.cleanup().await;
                Err(e)
            }
        }
    }

    async fn fill(
        &self,
        spec: &BuildSpec,
        content: &str,
        paths: &WorkingPaths,
        status: &StatusWriter,
    ) -> Result<(), PrepareError> {
        match self.check_cache(spec, paths, status).await {
            Ok(()) => return Ok(()),
            Err(e) if e.needs_install() => {
                tracing::info!(name = %spec.name, "{}; running install", e);
            }
            Err(e) => return Err(e),
        }

        self.repack(spec, content, paths, status).await?;

        match self.upload(spec, paths).await {
            Ok(Some(url)) => tracing::info!(name = %spec.name, url = %url, "Uploaded tarball"),
            Ok(None) => tracing::debug!(name = %spec.name, "Object storage not configured; skipping upload"),
            Err(e) => tracing::error!(name = %spec.name, "Tarball upload failed: {}", e),
        }
        Ok(())
    }

    /// Fetch a previously uploaded tarball into the working tarball path
    ///
    /// Every failure is a [`PrepareError::CacheMiss`].
    pub async fn check_cache(
        &self,
        spec: &BuildSpec,
        paths: &WorkingPaths,
        status: &StatusWriter,
    ) -> Result<(), PrepareError> {
        let miss = |reason: String| PrepareError::CacheMiss {
            name: spec.name.clone(),
            reason,
        };

        let Some(storage) = &self.storage else {
            return Err(miss("object storage is not configured".to_string()));
        };

        let key = spec.tarball_name();
        storage
            .get_file(&key)
            .await
            .map_err(|e| miss(e.to_string()))?;

        status.write_start(DOWNLOAD_KEY, None);
        match storage.download(&key, &paths.tarball_path).await {
            Ok(()) => {
                tracing::info!(name = %spec.name, tarball = %paths.tarball_path.display(), "Tarball download ok");
                status.write_end(DOWNLOAD_KEY, StatusEvent::message("Downloaded cached tarball"));
                Ok(())
            }
            Err(e) => {
                tracing::error!(name = %spec.name, "Tarball download failed: {}", e);
                status.write_end(DOWNLOAD_KEY, StatusEvent::message("Cached tarball download failed"));
                Err(miss(e.to_string()))
            }
        }
    }

    /// Unpack, install dependencies and repack into the working tarball path
    pub async fn repack(
        &self,
        spec: &BuildSpec,
        content: &str,
        paths: &WorkingPaths,
        status: &StatusWriter,
    ) -> Result<(), PrepareError> {
        status.write_start(UNPACK_KEY, None);
        archive::unpack_base64(content, &paths.install_path).await?;
        status.write_end(UNPACK_KEY, StatusEvent::message("Unpacked package"));

        self.install(spec, paths, status).await?;

        status.write_start(PACK_KEY, None);
        archive::pack_dir(&paths.package_dir(), &paths.tarball_path).await?;
        status.write_end(PACK_KEY, StatusEvent::message("Packed installed package"));
        Ok(())
    }

    async fn install(
        &self,
        spec: &BuildSpec,
        paths: &WorkingPaths,
        status: &StatusWriter,
    ) -> Result<(), PrepareError> {
        let request = InstallRequest {
            package_dir: paths.package_dir(),
            log_dir: paths.install_path.clone(),
            production: spec.env.is_production(),
        };
        let installer = self.installer.as_ref();
        let mut attempts = 0u32;

        status.write_start(INSTALL_ALL_KEY, None);
        let result = retry(
            &self.retry,
            &format!("npm install for {}", spec.name),
            |_: &InstallError| true,
            || {
                attempts += 1;
                let request = &request;
                async move {
                    status.write_start(INSTALL_KEY, Some("'npm install' attempt starting"));
                    let result = installer.install(request).await;
                    match &result {
                        Ok(()) => status.write_end(
                            INSTALL_KEY,
                            StatusEvent::message("'npm install' attempt completed successfully"),
                        ),
                        Err(e) => status.write_end(
                            INSTALL_KEY,
                            StatusEvent {
                                message: "ERROR: 'npm install' attempt failed".to_string(),
                                details: Some(e.to_string()),
                                locale: None,
                            },
                        ),
                    }
                    result
                }
            },
        )
        .await;
        let summary = if result.is_ok() {
            "Dependencies installed"
        } else {
            "ERROR: dependency install failed"
        };
        status.write_end(INSTALL_ALL_KEY, StatusEvent::message(summary));

        result.map_err(|e| PrepareError::Install {
            name: spec.name.clone(),
            attempts,
            error: e.to_string(),
        })
    }

    /// Upload the working tarball; `None` when storage is not configured
    pub async fn upload(
        &self,
        spec: &BuildSpec,
        paths: &WorkingPaths,
    ) -> Result<Option<String>, StorageError> {
        let Some(storage) = &self.storage else {
            return Ok(None);
        };
        storage
            .upload(&paths.tarball_path, &spec.tarball_name())
            .await
            .map(Some)
    }
}
