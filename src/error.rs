//! Error types for carpenter
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Publish payload and spec resolution errors
#[derive(Error, Debug)]
pub enum SpecError {
    /// The payload is not a publish document
    #[error("Malformed publish payload: {error}")]
    Malformed { error: String },

    /// Required payload field is missing or has the wrong shape
    #[error("Publish payload is missing required field '{field}'")]
    MissingField { field: String },

    /// `dist-tags.latest` points to a version that is not in `versions`
    #[error("Package '{name}' has no manifest for version '{version}'")]
    MissingVersion { name: String, version: String },

    /// Fetching a dependency manifest failed
    #[error("Failed to fetch manifest for dependency '{name}': {error}")]
    ManifestFetch { name: String, error: String },
}

/// Object storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// The object does not exist
    #[error("Object '{key}' not found in bucket '{bucket}'")]
    NotFound { bucket: String, key: String },

    /// Network or HTTP error
    #[error("Storage request for '{key}' failed: {error}")]
    Network { key: String, error: String },

    /// Local IO error
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Artifact preparation errors
#[derive(Error, Debug)]
pub enum PrepareError {
    /// No reusable tarball; the install pipeline has to run
    #[error("Tarball cache miss for '{name}': {reason}")]
    CacheMiss { name: String, reason: String },

    /// Dependency installer exited non-zero after all retries
    #[error("Dependency install for '{name}' failed after {attempts} attempt(s): {error}")]
    Install {
        name: String,
        attempts: u32,
        error: String,
    },

    /// Filesystem error
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },

    /// Tar/gzip error
    #[error("Archive error for '{path}': {error}")]
    Archive { path: PathBuf, error: String },

    /// Attachment content is not valid base64
    #[error("Failed to decode package content: {error}")]
    Decode { error: String },
}

impl PrepareError {
    /// Whether this error only means the install pipeline must run
    pub fn needs_install(&self) -> bool {
        matches!(self, Self::CacheMiss { .. })
    }
}

/// Dependency installer errors (single attempt)
#[derive(Error, Debug, Clone)]
pub enum InstallError {
    /// The installer could not be found or started
    #[error("Failed to run '{command}': {error}")]
    Spawn { command: String, error: String },

    /// The installer exited non-zero
    #[error("Installer exited with {}: {stderr}", code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    Exit { code: Option<i32>, stderr: String },

    /// Log files could not be created
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Message queue publish errors
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    /// No queue is configured
    #[error("Message queue is not configured")]
    NotConfigured,

    /// The queue rejected or could not receive the message
    #[error("Publish to topic '{topic}' failed: {error}")]
    Failed { topic: String, error: String },

    /// The payload could not be serialized
    #[error("Failed to encode message for topic '{topic}': {error}")]
    Encode { topic: String, error: String },
}

/// Per-locale dispatch errors
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    /// Too many failed locale dispatches for one name/env/version
    #[error("Dispatch for '{key}' (locale {locale}) failed {failures} time(s): {source}")]
    TooManyFailures {
        key: String,
        locale: String,
        failures: u32,
        source: PublishError,
    },
}

/// Working path cleanup errors
#[derive(Error, Debug)]
pub enum CleanupError {
    /// Failed to remove a path
    #[error("Failed to remove '{path}': {error}")]
    Remove { path: PathBuf, error: String },
}

/// Data model query errors
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Backend error
    #[error("Store query failed: {error}")]
    Backend { error: String },

    /// Snapshot could not be read
    #[error("Failed to load store snapshot '{path}': {error}")]
    Snapshot { path: PathBuf, error: String },
}

/// Catch-up scheduler errors
#[derive(Error, Debug, Clone)]
pub enum SchedulerError {
    /// Listing known packages failed
    #[error("Failed to list packages: {0}")]
    Packages(StoreError),

    /// Fetching build heads for one package failed
    #[error("Failed to fetch build heads for '{name}': {source}")]
    Heads { name: String, source: StoreError },

    /// Publishing a catch-up build failed
    #[error("Failed to queue catch-up build for '{name}': {source}")]
    Publish { name: String, source: PublishError },
}

/// Settings loading errors
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Failed to write a generated file
    #[error("Failed to write '{path}': {error}")]
    Write { path: PathBuf, error: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove a file or directory
    #[error("Failed to remove '{path}': {error}")]
    Remove { path: PathBuf, error: String },

    /// Failed to read a directory
    #[error("Failed to read directory '{path}': {error}")]
    ReadDir { path: PathBuf, error: String },
}

impl From<FilesystemError> for PrepareError {
    fn from(e: FilesystemError) -> Self {
        match e {
            FilesystemError::CreateDir { path, error }
            | FilesystemError::Remove { path, error }
            | FilesystemError::ReadDir { path, error } => Self::Io { path, error },
        }
    }
}

impl From<FilesystemError> for CleanupError {
    fn from(e: FilesystemError) -> Self {
        match e {
            FilesystemError::CreateDir { path, error }
            | FilesystemError::Remove { path, error }
            | FilesystemError::ReadDir { path, error } => Self::Remove { path, error },
        }
    }
}

/// Top-level error for one publish event
#[derive(Error, Debug)]
pub enum BuildError {
    /// Spec resolution failed
    #[error("Spec error: {0}")]
    Spec(#[from] SpecError),

    /// Artifact preparation failed
    #[error("Prepare error: {0}")]
    Prepare(#[from] PrepareError),

    /// Locale dispatch failed fatally
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// The build task panicked or was cancelled
    #[error("Build task aborted: {error}")]
    Aborted { error: String },
}
