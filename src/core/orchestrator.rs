//! Build orchestration
//!
//! Turns one publish event into per-locale build jobs: resolve the spec,
//! prepare the tarball once, fan out a dispatch per locale, then clean up
//! and end the progress stream exactly once.

use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{defaults, Settings};
use crate::core::failures::FailureTally;
use crate::core::packer::ArtifactPreparer;
use crate::core::payload::BuildRequest;
use crate::core::progress::{ProgressReporter, ProgressStream};
use crate::core::purge;
use crate::core::resolver::SpecResolver;
use crate::core::spec::{BuildSpec, BuildType, DispatchRecord};
use crate::core::status::{StatusEvent, StatusMetadata, StatusWriter};
use crate::core::timer::Timer;
use crate::error::{BuildError, DispatchError, PublishError};
use crate::infra::queue::{publish_with_retry, Publisher};
use crate::infra::retry::RetryPolicy;

const QUEUE_ALL_KEY: &str = "queue all builds";
const EVENT_CAPACITY: usize = 64;

/// Tunables for a [`BuildOrchestrator`]
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub topic: String,
    pub status_topic: String,
    pub max_failures: u32,
    /// Locale fan-out ceiling, unbounded when `None`
    pub concurrency: Option<usize>,
    pub dispatch_retry: RetryPolicy,
    pub status_retry: RetryPolicy,
    /// Root scanned by the purge janitor
    pub target: PathBuf,
    pub purge_age: Duration,
    pub purge_every: Duration,
    /// Janitor is disabled in development
    pub development: bool,
}

impl OrchestratorOptions {
    /// Options derived from loaded settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            topic: settings.topic().to_string(),
            status_topic: settings.status_topic().to_string(),
            max_failures: settings.max_failures(),
            concurrency: settings.concurrency,
            dispatch_retry: settings.dispatch_policy(),
            status_retry: settings.status_policy(),
            target: settings.target_root(),
            purge_age: settings.purge_age(),
            purge_every: settings.timeout(),
            development: settings.is_development(),
        }
    }
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    /// A locale record is about to be published
    Queue { topic: String, record: DispatchRecord },
    /// A locale record was accepted by the queue
    Queued { topic: String, record: DispatchRecord },
    /// A janitor tick finished
    Purge { removed: usize },
    /// A janitor tick could not scan the target root
    PurgeFailed { error: String },
}

/// How a publish event completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// No build was required
    Ignored,
    /// Every locale settled without a fatal failure
    Queued { dispatched: u32 },
}

/// Completion side of a running publish event
#[derive(Debug)]
pub struct BuildCompletion {
    reporter: Arc<ProgressReporter>,
    task: JoinHandle<Result<BuildOutcome, BuildError>>,
}

impl BuildCompletion {
    /// Reporter shared with the running task
    pub fn reporter(&self) -> &Arc<ProgressReporter> {
        &self.reporter
    }

    /// Wait for every locale dispatch to settle
    pub async fn wait(self) -> Result<BuildOutcome, BuildError> {
        self.task.await.map_err(|e| BuildError::Aborted {
            error: e.to_string(),
        })?
    }

    /// Wait for the outcome and then for the status topic to drain
    pub async fn wait_published(self) -> (Result<BuildOutcome, BuildError>, Result<(), PublishError>) {
        let reporter = Arc::clone(&self.reporter);
        let outcome = self.wait().await;
        let published = reporter.status().finished().await;
        (outcome, published)
    }
}

/// A running publish event
#[derive(Debug)]
pub struct BuildHandle {
    /// Line-delimited JSON progress for the caller
    pub progress: ProgressStream,
    pub completion: BuildCompletion,
}

impl BuildHandle {
    /// Wait for completion, discarding progress lines
    pub async fn wait(self) -> Result<BuildOutcome, BuildError> {
        self.completion.wait().await
    }
}

/// Publish-event pipeline shared by every build
pub struct BuildOrchestrator {
    resolver: SpecResolver,
    preparer: ArtifactPreparer,
    publisher: Arc<dyn Publisher>,
    status_publisher: Option<Arc<dyn Publisher>>,
    failures: Arc<FailureTally>,
    events: broadcast::Sender<OrchestratorEvent>,
    options: OrchestratorOptions,
}

impl BuildOrchestrator {
    /// Create an orchestrator with its own failure tally
    ///
    /// Status records go to `publisher` as well unless replaced with
    /// [`BuildOrchestrator::with_status_publisher`].
    pub fn new(
        resolver: SpecResolver,
        preparer: ArtifactPreparer,
        publisher: Arc<dyn Publisher>,
        options: OrchestratorOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            resolver,
            preparer,
            status_publisher: Some(Arc::clone(&publisher)),
            publisher,
            failures: Arc::new(FailureTally::new()),
            events,
            options,
        }
    }

    /// Publisher for status records; `None` disables the status sink
    #[must_use]
    pub fn with_status_publisher(mut self, publisher: Option<Arc<dyn Publisher>>) -> Self {
        self.status_publisher = publisher;
        self
    }

    /// Share a failure tally with other orchestrators
    #[must_use]
    pub fn with_failures(mut self, failures: Arc<FailureTally>) -> Self {
        self.failures = failures;
        self
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn failures(&self) -> &Arc<FailureTally> {
        &self.failures
    }

    /// Receive lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    fn reporter(&self) -> (Arc<ProgressReporter>, ProgressStream) {
        let status = StatusWriter::connect(
            self.status_publisher.clone(),
            &self.options.status_topic,
            self.options.status_retry,
        );
        let (reporter, progress) = ProgressReporter::new(Arc::new(status));
        (Arc::new(reporter), progress)
    }

    /// Start a publish event; returns immediately
    pub fn build(self: &Arc<Self>, request: BuildRequest) -> BuildHandle {
        let (reporter, progress) = self.reporter();
        let this = Arc::clone(self);
        let task_reporter = Arc::clone(&reporter);

        let task = tokio::spawn(async move { this.run(request, &task_reporter).await });

        BuildHandle {
            progress,
            completion: BuildCompletion { reporter, task },
        }
    }

    /// Queue a single locale record; the type defaults to webpack
    pub fn build_one(self: &Arc<Self>, mut record: DispatchRecord) -> BuildHandle {
        if record.build_type.is_none() {
            record.build_type = Some(BuildType::Webpack.as_str().to_string());
        }

        let (reporter, progress) = self.reporter();
        reporter.status().set_metadata(StatusMetadata::from(&record));
        let this = Arc::clone(self);
        let task_reporter = Arc::clone(&reporter);

        let task = tokio::spawn(async move {
            let id = uuid::Uuid::new_v4().to_string();
            let locale = record.locale.clone();
            task_reporter.start(&id, defaults::DISPATCH_STEPS, Some(&locale));
            task_reporter.step(&id, queuing_message(&record), Some(&locale));

            let key = record.key();
            let result = this.publish_record(record, &id, &task_reporter).await;
            this.failures.reset(&key);
            match result {
                Ok(()) => {
                    task_reporter.end(None);
                    Ok(BuildOutcome::Queued {
                        dispatched: task_reporter.status().builds_completed(),
                    })
                }
                Err(e) => {
                    task_reporter.end(Some(&e));
                    Err(BuildError::from(e))
                }
            }
        });

        BuildHandle {
            progress,
            completion: BuildCompletion { reporter, task },
        }
    }

    async fn run(
        &self,
        request: BuildRequest,
        reporter: &ProgressReporter,
    ) -> Result<BuildOutcome, BuildError> {
        let spec = match self.resolver.resolve(&request.payload, request.promote).await {
            Ok(spec) => spec,
            Err(e) => {
                tracing::error!("Build spec resolution failed: {}", e);
                reporter.abort(&e);
                return Err(e.into());
            }
        };

        reporter.status().set_metadata(StatusMetadata::from(&spec));

        if !spec.requires_build() {
            tracing::info!(name = %spec.name, version = %spec.version, "Ignoring build");
            reporter.ignore();
            return Ok(BuildOutcome::Ignored);
        }

        let content = request.payload.content(&spec);
        let paths = match self.preparer.prepare(&spec, content, reporter.status()).await {
            Ok(paths) => paths,
            Err(e) => {
                tracing::error!(name = %spec.name, "Artifact preparation failed: {}", e);
                reporter.abort(&e);
                return Err(e.into());
            }
        };

        reporter.status().write_start(QUEUE_ALL_KEY, None);
        let fatal = self.dispatch_all(&spec, reporter).await;

        match &fatal {
            Some(e) => {
                tracing::error!(key = %spec.key(), "Build queueing aborted: {}", e);
                reporter
                    .status()
                    .write_end(QUEUE_ALL_KEY, StatusEvent::message("ERROR: queueing aborted"));
            }
            None => {
                reporter
                    .status()
                    .write_end(QUEUE_ALL_KEY, StatusEvent::message("All builds queued"));
            }
        }
        self.failures.reset(&spec.key());

        if let Err(e) = paths.cleanup().await {
            tracing::warn!(name = %spec.name, "Cleanup of working paths failed: {}", e);
        }

        match fatal {
            Some(e) => {
                reporter.end(Some(&e));
                Err(e.into())
            }
            None => {
                reporter.end(None);
                Ok(BuildOutcome::Queued {
                    dispatched: reporter.status().builds_completed(),
                })
            }
        }
    }

    /// Dispatch every locale and return the first fatal failure
    async fn dispatch_all(&self, spec: &BuildSpec, reporter: &ProgressReporter) -> Option<DispatchError> {
        let limit = self
            .options
            .concurrency
            .unwrap_or(spec.locales.len())
            .max(1);

        let results: Vec<Result<(), DispatchError>> = stream::iter(spec.locales.clone())
            .map(|locale| async move { self.dispatch_locale(spec, &locale, reporter).await })
            .buffer_unordered(limit)
            .collect()
            .await;

        results.into_iter().find_map(Result::err)
    }

    async fn dispatch_locale(
        &self,
        spec: &BuildSpec,
        locale: &str,
        reporter: &ProgressReporter,
    ) -> Result<(), DispatchError> {
        let id = uuid::Uuid::new_v4().to_string();
        let record = spec.record(locale);

        reporter.start(&id, defaults::DISPATCH_STEPS, Some(locale));
        tracing::info!(id = %id, name = %spec.name, locale = %locale, "Queuing build");
        reporter.step(&id, queuing_message(&record), Some(locale));

        self.publish_record(record, &id, reporter).await
    }

    /// Publish one record; failures are fatal only past the tally limit
    async fn publish_record(
        &self,
        record: DispatchRecord,
        id: &str,
        reporter: &ProgressReporter,
    ) -> Result<(), DispatchError> {
        let topic = &self.options.topic;
        let _ = self.events.send(OrchestratorEvent::Queue {
            topic: topic.clone(),
            record: record.clone(),
        });

        let result = match serde_json::to_value(&record) {
            Ok(message) => {
                publish_with_retry(
                    self.publisher.as_ref(),
                    topic,
                    &message,
                    &self.options.dispatch_retry,
                )
                .await
            }
            Err(e) => Err(PublishError::Encode {
                topic: topic.clone(),
                error: e.to_string(),
            }),
        };

        match result {
            Ok(()) => {
                tracing::info!(id = %id, name = %record.name, locale = %record.locale, "Build queued");
                reporter.done(id, Some(&record.locale));
                let _ = self.events.send(OrchestratorEvent::Queued {
                    topic: topic.clone(),
                    record,
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!(id = %id, name = %record.name, locale = %record.locale, "Build queueing failed: {}", e);
                reporter.fail(&e, Some(id), Some(&record.locale));

                let key = record.key();
                let failures = self.failures.record(&key);
                if failures >= self.options.max_failures {
                    return Err(DispatchError::TooManyFailures {
                        key,
                        locale: record.locale,
                        failures,
                        source: e,
                    });
                }
                Ok(())
            }
        }
    }

    /// Start the purge janitor; `None` in development
    pub fn start_janitor(&self) -> Option<Timer> {
        if self.options.development {
            tracing::debug!("Purge janitor disabled in development");
            return None;
        }

        let target = self.options.target.clone();
        let max_age = self.options.purge_age;
        let events = self.events.clone();

        tracing::info!(
            target = %target.display(),
            every_ms = self.options.purge_every.as_millis() as u64,
            "Starting purge janitor"
        );
        Some(Timer::spawn(self.options.purge_every, move || {
            let target = target.clone();
            let events = events.clone();
            async move {
                match purge::purge(&target, max_age).await {
                    Ok(removed) => {
                        let _ = events.send(OrchestratorEvent::Purge { removed });
                    }
                    Err(e) => {
                        tracing::error!("Purge failed: {}", e);
                        let _ = events.send(OrchestratorEvent::PurgeFailed {
                            error: e.to_string(),
                        });
                    }
                }
            }
        }))
    }
}

fn queuing_message(record: &DispatchRecord) -> String {
    format!(
        "Queuing {} build {}",
        record.build_type.as_deref().unwrap_or_default(),
        record.name
    )
}
