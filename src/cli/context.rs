//! Service construction for commands
//!
//! Loads settings once and builds the orchestrator and scheduler from them.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::core::orchestrator::{BuildOrchestrator, OrchestratorOptions};
use crate::core::packer::ArtifactPreparer;
use crate::core::resolver::SpecResolver;
use crate::core::scheduler::{CatchUpScheduler, SchedulerOptions};
use crate::infra::dirs::CarpenterDirs;
use crate::infra::installer::{Installer, NpmInstaller};
use crate::infra::services;
use crate::registry::{MemoryStore, PackageStore};

/// Settings and directories shared by all commands
#[derive(Debug, Clone)]
pub struct ServiceContext {
    pub settings: Settings,
    pub dirs: CarpenterDirs,
    pub config_path: PathBuf,
}

impl ServiceContext {
    /// Load settings from `config` or the default config file
    pub fn load(config: Option<&Path>) -> Result<Self> {
        let dirs = CarpenterDirs::new();
        let settings = Settings::load(config, &dirs).context("Failed to load settings")?;
        let config_path = config.map_or_else(|| dirs.config_path(), Path::to_path_buf);
        tracing::debug!(config = %config_path.display(), env = %settings.env(), "Settings loaded");

        Ok(Self {
            settings,
            dirs,
            config_path,
        })
    }

    /// Load a store snapshot
    pub fn snapshot(path: &Path) -> Result<Arc<MemoryStore>> {
        let store = MemoryStore::from_snapshot(path)
            .with_context(|| format!("Failed to load store snapshot {}", path.display()))?;
        Ok(Arc::new(store))
    }

    /// Manifest store: a snapshot when given, otherwise the registry
    pub fn packages(&self, snapshot: Option<&Arc<MemoryStore>>) -> Arc<dyn PackageStore> {
        match snapshot {
            Some(store) => store.clone() as Arc<dyn PackageStore>,
            None => services::package_store(&self.settings),
        }
    }

    fn installer(&self) -> Result<Arc<dyn Installer>> {
        let npmrc = services::write_npmrc(&self.settings, &self.dirs)
            .context("Failed to write npmrc")?;

        match services::installer(&self.settings, npmrc.clone()) {
            Ok(installer) => Ok(installer),
            Err(e) => {
                tracing::warn!("{}; installs will fail until npm is available", e);
                Ok(Arc::new(NpmInstaller::new("npm", npmrc)))
            }
        }
    }

    /// Orchestrator resolving manifests through `packages`
    pub fn orchestrator(&self, packages: Arc<dyn PackageStore>) -> Result<Arc<BuildOrchestrator>> {
        let settings = &self.settings;

        let resolver = SpecResolver::new(packages)
            .with_roots(settings.source.clone(), settings.target.clone());

        let mut preparer = ArtifactPreparer::new(
            self.installer()?,
            settings.install_policy(),
            settings.install_root(),
            settings.tarball_root(),
        );
        if let Some(storage) = services::storage(settings) {
            preparer = preparer.with_storage(storage);
        }

        let publisher = services::publisher(settings);
        Ok(Arc::new(
            BuildOrchestrator::new(
                resolver,
                preparer,
                services::dispatcher(publisher.as_ref()),
                OrchestratorOptions::from_settings(settings),
            )
            .with_status_publisher(publisher),
        ))
    }

    /// Catch-up scheduler over a store snapshot
    pub fn scheduler(&self, store: &Arc<MemoryStore>) -> Arc<CatchUpScheduler> {
        Arc::new(CatchUpScheduler::new(
            store.clone(),
            store.clone(),
            services::dispatcher(services::publisher(&self.settings).as_ref()),
            SchedulerOptions::from_settings(&self.settings),
        ))
    }
}
