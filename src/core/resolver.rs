//! Spec resolution
//!
//! Turns a publish payload into a [`BuildSpec`]: build type and entry from
//! [`fitting`](crate::core::fitting), normalized environment, and the locale
//! set, falling back to the locales every dependency supports.

use futures::future::try_join_all;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::defaults;
use crate::core::fitting;
use crate::core::payload::PublishPayload;
use crate::core::spec::{BuildSpec, Env};
use crate::error::SpecError;
use crate::registry::{Manifest, PackageStore};

/// Compiles publish payloads into build specs
#[derive(Clone)]
pub struct SpecResolver {
    packages: Arc<dyn PackageStore>,
    source: Option<PathBuf>,
    target: Option<PathBuf>,
}

impl SpecResolver {
    /// Create a resolver reading dependency manifests from `packages`
    pub fn new(packages: Arc<dyn PackageStore>) -> Self {
        Self {
            packages,
            source: None,
            target: None,
        }
    }

    /// Source and target roots handed to workers with every spec
    #[must_use]
    pub fn with_roots(mut self, source: Option<PathBuf>, target: Option<PathBuf>) -> Self {
        self.source = source;
        self.target = target;
        self
    }

    /// Resolve a payload into a spec
    pub async fn resolve(&self, payload: &PublishPayload, promote: bool) -> Result<BuildSpec, SpecError> {
        let manifest = payload.manifest()?;
        let name = manifest
            .get("name")
            .and_then(Value::as_str)
            .or(payload.name.as_deref())
            .unwrap_or_default()
            .to_string();
        let version = manifest
            .get("version")
            .and_then(Value::as_str)
            .or(payload.latest())
            .unwrap_or_default()
            .to_string();

        tracing::info!(name = %name, "Compiling build spec");

        let classification = fitting::classify(manifest);
        let locales = match declared_locales(manifest) {
            Some(locales) if !locales.is_empty() => locales,
            _ => self.dependency_locales(manifest).await?,
        };

        let spec = BuildSpec {
            name,
            version,
            env: Env::normalize(payload.env.as_deref()),
            build_type: classification.build_type,
            build: manifest.get("build") != Some(&Value::Bool(false)),
            entry: classification.entry,
            locales,
            promote,
            source: self.source.clone(),
            target: self.target.clone(),
        };

        tracing::info!(
            name = %spec.name,
            version = %spec.version,
            env = %spec.env,
            build_type = ?spec.build_type,
            locales = ?spec.locales,
            "Compiled build spec"
        );
        Ok(spec)
    }

    /// Intersect the locales declared across the dependency tree
    ///
    /// Walks dependencies breadth first, fetching each package once. Packages
    /// without a `locales` array don't narrow the result.
    async fn dependency_locales(&self, root: &Manifest) -> Result<Vec<String>, SpecError> {
        let mut visited: HashSet<String> = HashSet::new();
        if let Some(name) = root.get("name").and_then(Value::as_str) {
            visited.insert(name.to_string());
        }

        let mut declared: Vec<Vec<String>> = declared_locales(root).into_iter().collect();
        let mut frontier = unvisited_dependencies(root, &mut visited);

        while !frontier.is_empty() {
            let manifests = try_join_all(frontier.iter().map(|name| self.fetch(name))).await?;

            frontier = Vec::new();
            for manifest in &manifests {
                declared.extend(declared_locales(manifest));
                frontier.extend(unvisited_dependencies(manifest, &mut visited));
            }
        }

        let locales = intersect(declared);
        if locales.is_empty() {
            return Ok(vec![defaults::DEFAULT_LOCALE.to_string()]);
        }
        Ok(locales)
    }

    async fn fetch(&self, name: &str) -> Result<Manifest, SpecError> {
        tracing::debug!("Fetching dependency manifest: {}", name);
        self.packages
            .get(name)
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| SpecError::ManifestFetch {
                name: name.to_string(),
                error: e.to_string(),
            })
    }
}

fn declared_locales(manifest: &Manifest) -> Option<Vec<String>> {
    let locales = manifest.get("locales")?.as_array()?;
    Some(
        locales
            .iter()
            .filter_map(Value::as_str)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn unvisited_dependencies(manifest: &Manifest, visited: &mut HashSet<String>) -> Vec<String> {
    manifest
        .get("dependencies")
        .and_then(Value::as_object)
        .map(|deps| {
            deps.keys()
                .filter(|name| visited.insert((*name).clone()))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// Intersection of all lists, in the order of the first one
fn intersect(lists: Vec<Vec<String>>) -> Vec<String> {
    let mut lists = lists.into_iter();
    let Some(first) = lists.next() else {
        return Vec::new();
    };
    let rest: Vec<HashSet<String>> = lists.map(|l| l.into_iter().collect()).collect();

    let mut seen = HashSet::new();
    first
        .into_iter()
        .filter(|locale| rest.iter().all(|set| set.contains(locale)))
        .filter(|locale| seen.insert(locale.clone()))
        .collect()
}
