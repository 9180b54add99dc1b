//! npm registry client
//!
//! Serves [`PackageStore::get`] from an npm-compatible registry by fetching
//! the package document and picking the `dist-tags.latest` version.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::config::defaults;
use crate::error::StoreError;
use crate::infra::storage::encode_uri_component;
use crate::registry::{Manifest, PackageStore};

/// Registry client for fetching package manifests
#[derive(Debug, Clone)]
pub struct RegistryClient {
    /// HTTP client
    client: reqwest::Client,
    /// Registry base URL
    url: String,
}

impl RegistryClient {
    /// Create a registry client for the public npm registry
    pub fn new() -> Self {
        Self::with_url(defaults::NPM_REGISTRY)
    }

    /// Create a registry client with a custom URL
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url: url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the registry URL
    pub fn url(&self) -> &str {
        &self.url
    }

    fn backend(name: &str, error: impl std::fmt::Display) -> StoreError {
        StoreError::Backend {
            error: format!("{name}: {error}"),
        }
    }
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the latest manifest out of a registry package document
pub fn latest_manifest(document: &Value) -> Option<Manifest> {
    let latest = document.get("dist-tags")?.get("latest")?.as_str()?;
    document.get("versions")?.get(latest)?.as_object().cloned()
}

#[async_trait]
impl PackageStore for RegistryClient {
    async fn get(&self, name: &str) -> Result<Option<Manifest>, StoreError> {
        let url = format!("{}/{}", self.url, encode_uri_component(name));
        tracing::debug!("Fetching manifest: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::backend(name, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::backend(name, format!("HTTP {}", response.status())));
        }

        let document: Value = response.json().await.map_err(|e| Self::backend(name, e))?;
        Ok(latest_manifest(&document))
    }
}
