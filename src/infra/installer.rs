//! Dependency installer
//!
//! Runs `npm install` inside an unpacked package with an isolated npmrc.
//! Output goes to `stdout.log` / `stderr.log` next to the package directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::InstallError;

/// One install invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    /// Unpacked package root (where `package.json` lives)
    pub package_dir: PathBuf,
    /// Directory receiving `stdout.log` and `stderr.log`
    pub log_dir: PathBuf,
    /// Install production dependencies only
    pub production: bool,
}

/// Installs a package's dependencies
#[async_trait]
pub trait Installer: Send + Sync {
    /// Run one install attempt
    async fn install(&self, request: &InstallRequest) -> Result<(), InstallError>;
}

/// `npm install` runner
#[derive(Debug, Clone)]
pub struct NpmInstaller {
    command: PathBuf,
    npmrc: PathBuf,
}

impl NpmInstaller {
    /// Use an explicit npm executable
    pub fn new(command: impl Into<PathBuf>, npmrc: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            npmrc: npmrc.into(),
        }
    }

    /// Use `command` if given, otherwise find `npm` on `PATH`
    pub fn resolve(command: Option<PathBuf>, npmrc: impl Into<PathBuf>) -> Result<Self, InstallError> {
        let command = match command {
            Some(command) => command,
            None => which::which("npm").map_err(|e| InstallError::Spawn {
                command: "npm".to_string(),
                error: e.to_string(),
            })?,
        };
        Ok(Self::new(command, npmrc))
    }

    /// npm executable
    pub fn command(&self) -> &Path {
        &self.command
    }

    fn log_file(path: &Path) -> Result<std::fs::File, InstallError> {
        std::fs::File::create(path).map_err(|e| InstallError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }
}

#[async_trait]
impl Installer for NpmInstaller {
    async fn install(&self, request: &InstallRequest) -> Result<(), InstallError> {
        let stdout_path = request.log_dir.join("stdout.log");
        let stderr_path = request.log_dir.join("stderr.log");
        let node_env = if request.production {
            "production"
        } else {
            "development"
        };

        tracing::info!(
            dir = %request.package_dir.display(),
            node_env,
            "Installing dependencies"
        );

        let status = tokio::process::Command::new(&self.command)
            .arg("install")
            .arg(format!("--userconfig={}", self.npmrc.display()))
            .current_dir(&request.package_dir)
            .env("NODE_ENV", node_env)
            .stdin(Stdio::null())
            .stdout(Self::log_file(&stdout_path)?)
            .stderr(Self::log_file(&stderr_path)?)
            .status()
            .await
            .map_err(|e| InstallError::Spawn {
                command: self.command.display().to_string(),
                error: e.to_string(),
            })?;

        if status.success() {
            tracing::info!(dir = %request.package_dir.display(), "Installed dependencies");
            return Ok(());
        }

        let stderr = tokio::fs::read_to_string(&stderr_path)
            .await
            .unwrap_or_default();
        Err(InstallError::Exit {
            code: status.code(),
            stderr: stderr.trim().to_string(),
        })
    }
}
