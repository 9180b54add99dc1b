//! Per-attempt working paths
//!
//! Every build attempt gets its own install directory and tarball path,
//! named `<stem>-<random suffix>` so concurrent attempts never collide.

use std::path::{Path, PathBuf};

use crate::error::{CleanupError, FilesystemError};
use crate::infra::filesystem;

/// Install directory and tarball path owned by one build attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingPaths {
    /// Directory the package is unpacked and installed into
    pub install_path: PathBuf,
    /// Repacked tarball location
    pub tarball_path: PathBuf,
}

impl WorkingPaths {
    /// Allocate unique paths under the given roots
    ///
    /// Both roots are created if needed. The paths themselves are not created.
    pub async fn allocate(
        install_root: &Path,
        tarball_root: &Path,
        stem: &str,
    ) -> Result<Self, FilesystemError> {
        filesystem::create_dir_all(install_root).await?;
        filesystem::create_dir_all(tarball_root).await?;

        let unique = format!("{stem}-{}", random_suffix());
        let paths = Self {
            install_path: install_root.join(&unique),
            tarball_path: tarball_root.join(format!("{unique}.tgz")),
        };

        tracing::debug!(
            install = %paths.install_path.display(),
            tarball = %paths.tarball_path.display(),
            "Created working paths"
        );
        Ok(paths)
    }

    /// Root of the unpacked package inside the install directory
    pub fn package_dir(&self) -> PathBuf {
        self.install_path.join("package")
    }

    /// Remove every working path
    ///
    /// Each path is attempted independently; the first failure is returned.
    pub async fn cleanup(&self) -> Result<(), CleanupError> {
        let mut first = None;

        for path in [&self.install_path, &self.tarball_path] {
            if let Err(e) = filesystem::remove_path(path).await {
                let e = CleanupError::from(e);
                tracing::warn!("{}", e);
                first.get_or_insert(e);
            }
        }

        tracing::debug!(install = %self.install_path.display(), "Cleaned up working paths");
        first.map_or(Ok(()), Err)
    }
}

/// Ten hex characters of randomness
fn random_suffix() -> String {
    let id = uuid::Uuid::new_v4();
    hex::encode(&id.as_bytes()[..5])
}
