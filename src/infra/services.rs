//! Service wiring
//!
//! Builds the concrete queue, storage, installer and registry clients from
//! loaded settings.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{defaults, Settings};
use crate::error::{InstallError, SettingsError};
use crate::infra::dirs::CarpenterDirs;
use crate::infra::installer::{Installer, NpmInstaller};
use crate::infra::npmrc;
use crate::infra::queue::{NsqPublisher, Publisher, Unconfigured};
use crate::infra::storage::{HttpObjectStorage, ObjectStorage};
use crate::registry::{ManifestCache, PackageStore, RegistryClient};

/// Queue publisher, when an nsqd URL is configured
pub fn publisher(settings: &Settings) -> Option<Arc<dyn Publisher>> {
    let url = settings.nsq.url.as_deref()?;
    tracing::debug!(url = %url, "Using nsqd publisher");
    Some(Arc::new(NsqPublisher::new(url)))
}

/// Build dispatch publisher; publishes fail when no queue is configured
pub fn dispatcher(publisher: Option<&Arc<dyn Publisher>>) -> Arc<dyn Publisher> {
    match publisher {
        Some(publisher) => Arc::clone(publisher),
        None => {
            tracing::warn!("No message queue configured; build dispatches will fail");
            Arc::new(Unconfigured)
        }
    }
}

/// Object storage, when both endpoint and bucket are configured
pub fn storage(settings: &Settings) -> Option<Arc<dyn ObjectStorage>> {
    let url = settings.storage.url.as_deref()?;
    let bucket = settings.storage.bucket.as_deref()?;
    tracing::debug!(url = %url, bucket = %bucket, "Using object storage");
    Some(Arc::new(HttpObjectStorage::new(url, bucket)))
}

/// Write the isolated npmrc and return its path
pub fn write_npmrc(settings: &Settings, dirs: &CarpenterDirs) -> Result<PathBuf, SettingsError> {
    let path = dirs.npmrc_path();
    npmrc::create_npmrc(
        &path,
        settings.npm.registry.as_deref().unwrap_or(defaults::NPM_REGISTRY),
        settings.npm.auth.as_deref(),
        settings.npm.loglevel.as_deref().unwrap_or(defaults::NPM_LOGLEVEL),
    )?;
    Ok(path)
}

/// npm installer using the configured or `PATH` executable
pub fn installer(settings: &Settings, npmrc: PathBuf) -> Result<Arc<dyn Installer>, InstallError> {
    let installer = NpmInstaller::resolve(settings.npm.command.clone(), npmrc)?;
    tracing::debug!(command = %installer.command().display(), "Using npm installer");
    Ok(Arc::new(installer))
}

/// Registry-backed manifest store with a TTL cache
pub fn package_store(settings: &Settings) -> Arc<dyn PackageStore> {
    let client = match settings.registry.url.as_deref() {
        Some(url) => RegistryClient::with_url(url),
        None => RegistryClient::new(),
    };
    Arc::new(ManifestCache::new(client, settings.registry_ttl()))
}
