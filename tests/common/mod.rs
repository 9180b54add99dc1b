//! Common test utilities and helpers
//!
//! Fakes for the queue, object storage and installer seams, plus fixtures
//! for publish payloads and package tarballs.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use carpenter::core::orchestrator::{BuildOrchestrator, OrchestratorOptions};
use carpenter::core::packer::ArtifactPreparer;
use carpenter::core::resolver::SpecResolver;
use carpenter::error::{InstallError, PublishError, StorageError};
use carpenter::infra::installer::{InstallRequest, Installer};
use carpenter::infra::queue::Publisher;
use carpenter::infra::retry::RetryPolicy;
use carpenter::infra::storage::ObjectStorage;
use carpenter::registry::{MemoryStore, PackageStore};

pub const BUILD_TOPIC: &str = "build";
pub const STATUS_TOPIC: &str = "build-status";

/// Retry policy that gives up quickly
pub fn fast_retry(retries: u32) -> RetryPolicy {
    RetryPolicy::bounded(retries, Duration::from_millis(1), Duration::from_millis(2))
}

/// Test project context
///
/// A temporary directory holding working roots, snapshots and config files.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path).expect("Failed to create directory");
        path
    }

    /// Entry names directly under `name`, sorted; empty if missing
    pub fn entries(&self, name: &str) -> Vec<String> {
        let Ok(read) = std::fs::read_dir(self.dir.path().join(name)) else {
            return Vec::new();
        };
        let mut names: Vec<String> = read
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

type FailWhen = Box<dyn Fn(&str, &Value) -> bool + Send + Sync>;

/// Publisher that records every accepted message
#[derive(Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<(String, Value)>>,
    attempts: AtomicU32,
    fail_when: Option<FailWhen>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject messages matching `predicate`
    pub fn failing_when(predicate: impl Fn(&str, &Value) -> bool + Send + Sync + 'static) -> Self {
        Self {
            fail_when: Some(Box::new(predicate)),
            ..Self::default()
        }
    }

    /// Reject every build topic message for `locale`
    pub fn failing_locales(locales: &[&str]) -> Self {
        let locales: Vec<String> = locales.iter().map(ToString::to_string).collect();
        Self::failing_when(move |topic, message| {
            topic == BUILD_TOPIC
                && message["locale"]
                    .as_str()
                    .is_some_and(|l| locales.iter().any(|f| f == l))
        })
    }

    /// Accepted messages on `topic`, in publish order
    pub fn messages(&self, topic: &str) -> Vec<Value> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Every publish call, accepted or not
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, message: &Value) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_when.as_ref().is_some_and(|f| f(topic, message)) {
            return Err(PublishError::Failed {
                topic: topic.to_string(),
                error: "connection refused".to_string(),
            });
        }
        self.messages
            .lock()
            .unwrap()
            .push((topic.to_string(), message.clone()));
        Ok(())
    }
}

/// In-memory object storage
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_downloads: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose downloads always fail
    pub fn broken_downloads() -> Self {
        Self {
            fail_downloads: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn bucket(&self) -> &str {
        "tarballs"
    }

    async fn get_file(&self, key: &str) -> Result<(), StorageError> {
        if self.objects.lock().unwrap().contains_key(key) {
            Ok(())
        } else {
            Err(StorageError::NotFound {
                bucket: self.bucket().to_string(),
                key: key.to_string(),
            })
        }
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<(), StorageError> {
        if self.fail_downloads {
            return Err(StorageError::Network {
                key: key.to_string(),
                error: "connection reset".to_string(),
            });
        }
        let bytes = self.objects.lock().unwrap().get(key).cloned().ok_or_else(|| {
            StorageError::NotFound {
                bucket: self.bucket().to_string(),
                key: key.to_string(),
            }
        })?;
        std::fs::write(dest, bytes).map_err(|e| StorageError::Io {
            path: dest.to_path_buf(),
            error: e.to_string(),
        })
    }

    async fn upload(&self, local: &Path, key: &str) -> Result<String, StorageError> {
        let bytes = std::fs::read(local).map_err(|e| StorageError::Io {
            path: local.to_path_buf(),
            error: e.to_string(),
        })?;
        self.insert(key, bytes);
        Ok(format!("memory://tarballs/{key}"))
    }
}

/// Installer that writes a marker instead of running npm
#[derive(Default)]
pub struct StubInstaller {
    calls: AtomicU32,
    failures: u32,
}

impl StubInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `failures` attempts
    pub fn failing(failures: u32) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Installer for StubInstaller {
    async fn install(&self, request: &InstallRequest) -> Result<(), InstallError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(InstallError::Exit {
                code: Some(1),
                stderr: "npm ERR! network".to_string(),
            });
        }

        let modules = request.package_dir.join("node_modules");
        std::fs::create_dir_all(&modules).map_err(|e| InstallError::Io {
            path: modules.clone(),
            error: e.to_string(),
        })?;
        let marker = modules.join(".installed");
        let env = if request.production { "production" } else { "development" };
        std::fs::write(&marker, env).map_err(|e| InstallError::Io {
            path: marker,
            error: e.to_string(),
        })
    }
}

/// Gzipped tarball with `package/package.json`
pub fn tarball(manifest: &Value) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let content = serde_json::to_vec_pretty(manifest).unwrap();
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "package/package.json", content.as_slice())
        .unwrap();

    builder.into_inner().unwrap().finish().unwrap()
}

/// Publish payload for `name@version` with the tarball attached
pub fn payload(name: &str, version: &str, manifest: Value, env: &str) -> Value {
    let mut version_manifest = manifest;
    version_manifest["name"] = json!(name);
    version_manifest["version"] = json!(version);

    let data = base64::engine::general_purpose::STANDARD.encode(tarball(&version_manifest));
    json!({
        "name": name,
        "dist-tags": {"latest": version},
        "versions": {version: version_manifest},
        "_attachments": {format!("{name}-{version}.tgz"): {"data": data}},
        "env": env,
    })
}

/// Orchestrator wired to in-memory fakes
pub struct Harness {
    pub project: TestProject,
    pub publisher: Arc<RecordingPublisher>,
    pub installer: Arc<StubInstaller>,
    pub storage: Option<Arc<MemoryStorage>>,
    pub packages: Arc<MemoryStore>,
    pub options: OrchestratorOptions,
}

impl Harness {
    pub fn new(publisher: RecordingPublisher) -> Self {
        let project = TestProject::new();
        let options = OrchestratorOptions {
            topic: BUILD_TOPIC.to_string(),
            status_topic: STATUS_TOPIC.to_string(),
            max_failures: 2,
            concurrency: None,
            dispatch_retry: fast_retry(1),
            status_retry: fast_retry(0),
            target: project.path().join("target"),
            purge_age: Duration::from_secs(3600),
            purge_every: Duration::from_secs(60),
            development: false,
        };
        Self {
            project,
            publisher: Arc::new(publisher),
            installer: Arc::new(StubInstaller::new()),
            storage: None,
            packages: Arc::new(MemoryStore::new()),
            options,
        }
    }

    pub fn install_root(&self) -> PathBuf {
        self.project.path().join("install")
    }

    pub fn tarball_root(&self) -> PathBuf {
        self.project.path().join("tarballs")
    }

    pub fn preparer(&self) -> ArtifactPreparer {
        let preparer = ArtifactPreparer::new(
            self.installer.clone(),
            fast_retry(1),
            self.install_root(),
            self.tarball_root(),
        );
        match &self.storage {
            Some(storage) => preparer.with_storage(storage.clone()),
            None => preparer,
        }
    }

    pub fn orchestrator(&self) -> Arc<BuildOrchestrator> {
        let publisher: Arc<dyn Publisher> = self.publisher.clone();
        self.orchestrator_with_status(Some(publisher))
    }

    /// Orchestrator whose status records go to `status` instead
    pub fn orchestrator_with_status(
        &self,
        status: Option<Arc<dyn Publisher>>,
    ) -> Arc<BuildOrchestrator> {
        let packages: Arc<dyn PackageStore> = self.packages.clone();
        Arc::new(
            BuildOrchestrator::new(
                SpecResolver::new(packages),
                self.preparer(),
                self.publisher.clone(),
                self.options.clone(),
            )
            .with_status_publisher(status),
        )
    }
}
