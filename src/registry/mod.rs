//! Package data model
//!
//! Read-only query interfaces over package manifests, per-locale build heads
//! and the known-package cache, plus the implementations the service ships
//! with: an npm registry client, a TTL manifest cache and an in-memory store.

pub mod cache;
pub mod client;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use cache::ManifestCache;
pub use client::RegistryClient;
pub use memory::MemoryStore;

/// A package manifest (one version of `package.json`)
pub type Manifest = serde_json::Map<String, serde_json::Value>;

/// Last known dispatched version for one package, environment and locale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildHead {
    pub name: String,
    pub env: String,
    pub version: String,
    pub locale: String,
}

/// Entry of the known-package cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPackage {
    pub name: String,
    /// Build type recorded for the package
    #[serde(default, rename = "build")]
    pub build_type: Option<String>,
}

/// Looks up stored manifests by package name
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Latest stored manifest, `None` if the package is unknown
    async fn get(&self, name: &str) -> Result<Option<Manifest>, StoreError>;
}

/// Looks up build heads
#[async_trait]
pub trait BuildHeadStore: Send + Sync {
    /// Every locale head for `name` in `env`
    async fn find_all(&self, name: &str, env: &str) -> Result<Vec<BuildHead>, StoreError>;
}

/// Enumerates known packages
#[async_trait]
pub trait PackageCache: Send + Sync {
    /// Every known package
    async fn find_all(&self) -> Result<Vec<CachedPackage>, StoreError>;
}
