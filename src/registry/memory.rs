//! In-memory data model
//!
//! Backs all three query interfaces from memory. The CLI loads it from a
//! JSON snapshot:
//!
//! ```json
//! {
//!   "packages": {"dep": {"locales": ["en-US", "nl"]}},
//!   "heads": [{"name": "p", "env": "test", "version": "1.0.0", "locale": "it"}],
//!   "cache": [{"name": "p", "build": "webpack"}]
//! }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use crate::error::StoreError;
use crate::registry::{BuildHead, BuildHeadStore, CachedPackage, Manifest, PackageCache, PackageStore};

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    packages: HashMap<String, Manifest>,
    #[serde(default)]
    heads: Vec<BuildHead>,
    #[serde(default)]
    cache: Vec<CachedPackage>,
}

/// In-memory package, build head and package cache store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Snapshot>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON snapshot file
    pub fn from_snapshot(path: &Path) -> Result<Self, StoreError> {
        let snapshot_error = |error: String| StoreError::Snapshot {
            path: path.to_path_buf(),
            error,
        };

        let content = std::fs::read_to_string(path).map_err(|e| snapshot_error(e.to_string()))?;
        let snapshot: Snapshot =
            serde_json::from_str(&content).map_err(|e| snapshot_error(e.to_string()))?;

        tracing::debug!(
            packages = snapshot.packages.len(),
            heads = snapshot.heads.len(),
            cache = snapshot.cache.len(),
            "Loaded store snapshot"
        );
        Ok(Self {
            inner: RwLock::new(snapshot),
        })
    }

    /// Store a manifest
    pub fn insert_package(&self, name: impl Into<String>, manifest: Manifest) {
        self.write().packages.insert(name.into(), manifest);
    }

    /// Store a build head
    pub fn insert_head(&self, head: BuildHead) {
        self.write().heads.push(head);
    }

    /// Register a known package
    pub fn insert_cached(&self, package: CachedPackage) {
        self.write().cache.push(package);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Snapshot> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PackageStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<Manifest>, StoreError> {
        Ok(self.read().packages.get(name).cloned())
    }
}

#[async_trait]
impl BuildHeadStore for MemoryStore {
    async fn find_all(&self, name: &str, env: &str) -> Result<Vec<BuildHead>, StoreError> {
        Ok(self
            .read()
            .heads
            .iter()
            .filter(|head| head.name == name && head.env == env)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PackageCache for MemoryStore {
    async fn find_all(&self) -> Result<Vec<CachedPackage>, StoreError> {
        Ok(self.read().cache.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn head(name: &str, env: &str, locale: &str) -> BuildHead {
        BuildHead {
            name: name.to_string(),
            env: env.to_string(),
            version: "1.0.0".to_string(),
            locale: locale.to_string(),
        }
    }

    #[tokio::test]
    async fn test_heads_filter_by_name_and_env() {
        let store = MemoryStore::new();
        store.insert_head(head("p", "test", "it"));
        store.insert_head(head("p", "prod", "it"));
        store.insert_head(head("q", "test", "en"));

        let heads = BuildHeadStore::find_all(&store, "p", "test").await.unwrap();
        assert_eq!(heads, vec![head("p", "test", "it")]);
    }

    #[tokio::test]
    async fn test_from_snapshot() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        std::fs::write(
            &path,
            r#"{
                "packages": {"dep": {"locales": ["nl"]}},
                "heads": [{"name": "p", "env": "test", "version": "1.0.0", "locale": "it"}],
                "cache": [{"name": "p", "build": "webpack"}]
            }"#,
        )
        .unwrap();

        let store = MemoryStore::from_snapshot(&path).unwrap();
        assert!(store.get("dep").await.unwrap().is_some());
        assert!(store.get("missing").await.unwrap().is_none());
        let cached = PackageCache::find_all(&store).await.unwrap();
        assert_eq!(cached[0].build_type.as_deref(), Some("webpack"));
    }

    #[test]
    fn test_invalid_snapshot() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            MemoryStore::from_snapshot(&path),
            Err(StoreError::Snapshot { .. })
        ));
    }
}
