//! Manifest cache
//!
//! Wraps a [`PackageStore`] and keeps fetched manifests for a fixed TTL, so
//! publishes of packages sharing dependencies don't refetch them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::error::StoreError;
use crate::registry::{Manifest, PackageStore};

/// TTL cache in front of a package store
#[derive(Debug)]
pub struct ManifestCache<S> {
    inner: S,
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Option<Manifest>)>>,
}

impl<S: PackageStore> ManifestCache<S> {
    /// Create a cache with the given TTL
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Drop every cached entry
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn lookup(&self, name: &str) -> Option<Option<Manifest>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(name)
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, manifest)| manifest.clone())
    }
}

#[async_trait]
impl<S: PackageStore> PackageStore for ManifestCache<S> {
    async fn get(&self, name: &str) -> Result<Option<Manifest>, StoreError> {
        if let Some(cached) = self.lookup(name) {
            tracing::debug!("Manifest cache hit: {}", name);
            return Ok(cached);
        }

        let manifest = self.inner.get(name).await?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), (Instant::now(), manifest.clone()));
        Ok(manifest)
    }
}
