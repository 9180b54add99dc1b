//! Service configuration
//!
//! Reads settings from `config.toml`. Every field is optional; the effective
//! value falls back to [`defaults`] through the accessor methods, so a
//! missing config file is a valid (all-defaults) configuration.

pub mod defaults;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SettingsError;
use crate::infra::dirs::CarpenterDirs;
use crate::infra::retry::RetryPolicy;

/// Service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Service environment; purging is disabled in `development`
    pub env: Option<String>,

    /// Catch-up scheduler concurrency
    pub throttle: Option<usize>,

    /// Locale fan-out ceiling (unbounded when unset)
    pub concurrency: Option<usize>,

    /// Failed locale dispatches tolerated per name/env/version
    pub max_failures: Option<u32>,

    /// Build timeout in milliseconds, also the purge cadence
    pub timeout_ms: Option<u64>,

    /// Extra purge age multiplier on top of the fixed padding
    pub purge_retries: Option<u32>,

    /// Build source root handed to workers
    pub source: Option<PathBuf>,

    /// Build target root handed to workers and scanned by the purge janitor
    pub target: Option<PathBuf>,

    /// Root for unpacked install directories
    pub install: Option<PathBuf>,

    /// Root for repacked tarballs
    pub tarballs: Option<PathBuf>,

    /// Build dispatch topic
    pub topic: Option<String>,

    /// Status event topic
    pub status_topic: Option<String>,

    /// Catch-up interval in milliseconds
    pub interval_ms: Option<u64>,

    /// Environments the catch-up scheduler runs for in `serve`
    #[serde(default)]
    pub schedule_envs: Vec<String>,

    /// Dependency installer retry settings
    #[serde(default)]
    pub retry: RetrySettings,

    /// Locale dispatch retry settings
    #[serde(default)]
    pub dispatch: RetrySettings,

    /// Message queue settings
    #[serde(default)]
    pub nsq: NsqSettings,

    /// Object storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// npm settings
    #[serde(default)]
    pub npm: NpmSettings,

    /// Package registry settings
    #[serde(default)]
    pub registry: RegistrySettings,
}

/// Retry settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub retries: Option<u32>,

    /// Backoff floor in milliseconds
    pub min_ms: Option<u64>,

    /// Backoff cap in milliseconds
    pub max_ms: Option<u64>,
}

/// Message queue settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NsqSettings {
    /// nsqd HTTP endpoint, e.g. `http://127.0.0.1:4151`
    pub url: Option<String>,
}

/// Object storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// S3-compatible endpoint
    pub url: Option<String>,

    /// Bucket holding repacked tarballs
    pub bucket: Option<String>,
}

/// npm settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NpmSettings {
    /// Registry used for dependency installs
    pub registry: Option<String>,

    /// Registry credentials (`user:password`)
    pub auth: Option<String>,

    /// npm log level
    pub loglevel: Option<String>,

    /// npm executable; resolved from `PATH` when unset
    pub command: Option<PathBuf>,
}

/// Package registry settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// npm-compatible registry the package model reads manifests from
    pub url: Option<String>,

    /// Manifest cache TTL in seconds
    pub ttl: Option<u64>,
}

impl Settings {
    /// Load settings from an explicit path or the config directory
    pub fn load(path: Option<&Path>, dirs: &CarpenterDirs) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load_from_path(&dirs.config_path()),
        }
    }

    /// Load settings from a specific path
    ///
    /// A missing file yields the defaults; an unreadable or invalid file is an error.
    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| SettingsError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| SettingsError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Render the settings as TOML
    pub fn to_toml(&self) -> Result<String, SettingsError> {
        toml::to_string_pretty(self).map_err(|e| SettingsError::Parse {
            path: PathBuf::from("<settings>"),
            error: e.to_string(),
        })
    }

    /// Service environment
    #[must_use]
    pub fn env(&self) -> &str {
        self.env.as_deref().unwrap_or(defaults::SERVICE_ENV)
    }

    /// Whether the service runs in development
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.env() == "development"
    }

    /// Catch-up scheduler concurrency
    #[must_use]
    pub fn throttle(&self) -> usize {
        self.throttle.unwrap_or(defaults::THROTTLE).max(1)
    }

    /// Failed locale dispatches tolerated per name/env/version
    #[must_use]
    pub fn max_failures(&self) -> u32 {
        self.max_failures.unwrap_or(defaults::MAX_FAILURES).max(1)
    }

    /// Build timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(defaults::TIMEOUT_MS))
    }

    /// Age after which an abandoned target entry is purged
    #[must_use]
    pub fn purge_age(&self) -> Duration {
        let multiplier = self.purge_retries.unwrap_or(0) + defaults::PURGE_RETRY_PADDING;
        self.timeout() * multiplier
    }

    /// Catch-up interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.unwrap_or(defaults::SCHEDULE_INTERVAL_MS))
    }

    /// Build target root
    #[must_use]
    pub fn target_root(&self) -> PathBuf {
        self.target.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Root for unpacked install directories
    #[must_use]
    pub fn install_root(&self) -> PathBuf {
        self.install
            .clone()
            .unwrap_or_else(|| self.target_root().join("install"))
    }

    /// Root for repacked tarballs
    #[must_use]
    pub fn tarball_root(&self) -> PathBuf {
        self.tarballs
            .clone()
            .unwrap_or_else(|| self.target_root().join("tarballs"))
    }

    /// Build dispatch topic
    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic.as_deref().unwrap_or(defaults::BUILD_TOPIC)
    }

    /// Status event topic
    #[must_use]
    pub fn status_topic(&self) -> &str {
        self.status_topic.as_deref().unwrap_or(defaults::STATUS_TOPIC)
    }

    /// Retry policy for dependency installs
    #[must_use]
    pub fn install_policy(&self) -> RetryPolicy {
        RetryPolicy::bounded(
            self.retry.retries.unwrap_or(defaults::INSTALL_RETRIES),
            Duration::from_millis(self.retry.min_ms.unwrap_or(defaults::INSTALL_RETRY_MIN_MS)),
            Duration::from_millis(self.retry.max_ms.unwrap_or(defaults::INSTALL_RETRY_MAX_MS)),
        )
    }

    /// Retry policy for locale dispatch publishes
    #[must_use]
    pub fn dispatch_policy(&self) -> RetryPolicy {
        RetryPolicy::bounded(
            self.dispatch.retries.unwrap_or(defaults::DISPATCH_RETRIES),
            Duration::from_millis(self.dispatch.min_ms.unwrap_or(defaults::PUBLISH_RETRY_MIN_MS)),
            Duration::from_millis(self.dispatch.max_ms.unwrap_or(defaults::PUBLISH_RETRY_MAX_MS)),
        )
    }

    /// Retry policy for the durable status stream
    #[must_use]
    pub fn status_policy(&self) -> RetryPolicy {
        RetryPolicy::infinite(
            Duration::from_millis(defaults::PUBLISH_RETRY_MIN_MS),
            Duration::from_millis(defaults::PUBLISH_RETRY_MAX_MS),
        )
    }

    /// Manifest cache TTL
    #[must_use]
    pub fn registry_ttl(&self) -> Duration {
        Duration::from_secs(self.registry.ttl.unwrap_or(defaults::REGISTRY_CACHE_TTL))
    }
}
