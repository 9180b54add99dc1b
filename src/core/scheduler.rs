//! Catch-up scheduling
//!
//! Finds locales whose last dispatched version is behind the newest version
//! of the same package and environment, and queues builds for them.

use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::Settings;
use crate::core::lookup::Lookup;
use crate::core::spec::Env;
use crate::core::timer::Timer;
use crate::error::{PublishError, SchedulerError};
use crate::infra::queue::{Publisher, RetryWriter};
use crate::infra::retry::RetryPolicy;
use crate::registry::{BuildHeadStore, CachedPackage, PackageCache};

const EVENT_CAPACITY: usize = 16;

/// Tunables for a [`CatchUpScheduler`]
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub topic: String,
    /// Packages looked up concurrently
    pub throttle: usize,
    pub retry: RetryPolicy,
}

impl SchedulerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            topic: settings.topic().to_string(),
            throttle: settings.throttle(),
            retry: settings.status_policy(),
        }
    }
}

/// Result of one catch-up run
#[derive(Debug, Clone, Default)]
pub struct ScheduleReport {
    /// Missing builds queued per package with at least one head
    pub counts: BTreeMap<String, usize>,
    /// Packages whose lookup or publish failed
    pub failures: Vec<SchedulerError>,
}

impl ScheduleReport {
    /// Builds queued across all packages
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Timer notifications
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A run is starting
    Schedule { env: String },
    /// A run finished
    Scheduled {
        env: String,
        result: Result<ScheduleReport, SchedulerError>,
    },
}

/// Catch-up scheduler with one timer per environment
pub struct CatchUpScheduler {
    packages: Arc<dyn PackageCache>,
    heads: Arc<dyn BuildHeadStore>,
    publisher: Arc<dyn Publisher>,
    options: SchedulerOptions,
    timers: Mutex<HashMap<String, Timer>>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl CatchUpScheduler {
    pub fn new(
        packages: Arc<dyn PackageCache>,
        heads: Arc<dyn BuildHeadStore>,
        publisher: Arc<dyn Publisher>,
        options: SchedulerOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            packages,
            heads,
            publisher,
            options,
            timers: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Receive timer events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Queue missing builds for every known package in `env`
    ///
    /// Only a failure to list packages fails the run; per-package failures
    /// are collected in the report.
    pub async fn schedule(&self, env: &str) -> Result<ScheduleReport, SchedulerError> {
        let env = Env::normalize(Some(env)).as_str();
        let packages = self
            .packages
            .find_all()
            .await
            .map_err(SchedulerError::Packages)?;

        tracing::info!(env = %env, packages = packages.len(), "Scheduling catch-up builds");

        let results: Vec<(String, Result<Option<usize>, SchedulerError>)> = stream::iter(packages)
            .map(|package| async move {
                let name = package.name.clone();
                (name, self.catch_up(package, env).await)
            })
            .buffer_unordered(self.options.throttle.max(1))
            .collect()
            .await;

        let mut report = ScheduleReport::default();
        for (name, result) in results {
            match result {
                Ok(Some(count)) => {
                    report.counts.insert(name, count);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(env = %env, "{}", e);
                    report.failures.push(e);
                }
            }
        }

        tracing::info!(
            env = %env,
            queued = report.total(),
            failed = report.failures.len(),
            "Catch-up scheduling done"
        );
        Ok(report)
    }

    /// Queue missing builds for one package; `None` when it has no heads
    async fn catch_up(
        &self,
        package: CachedPackage,
        env: &str,
    ) -> Result<Option<usize>, SchedulerError> {
        let name = package.name.clone();
        let heads = self
            .heads
            .find_all(&name, env)
            .await
            .map_err(|source| SchedulerError::Heads {
                name: name.clone(),
                source,
            })?;

        if heads.is_empty() {
            tracing::debug!(name = %name, env = %env, "No build heads");
            return Ok(None);
        }

        let missing = Lookup::new(package, heads).missing();
        if missing.is_empty() {
            return Ok(Some(0));
        }

        let publish_error = |source: PublishError| SchedulerError::Publish {
            name: name.clone(),
            source,
        };

        let writer = RetryWriter::spawn(
            Arc::clone(&self.publisher),
            self.options.topic.clone(),
            self.options.retry,
        );
        for record in &missing {
            tracing::info!(
                name = %record.name,
                locale = %record.locale,
                version = %record.version,
                "Queuing catch-up build"
            );
            let message = serde_json::to_value(record).map_err(|e| {
                publish_error(PublishError::Encode {
                    topic: self.options.topic.clone(),
                    error: e.to_string(),
                })
            });
            match message {
                Ok(message) => {
                    writer.write(message);
                }
                Err(e) => {
                    writer.close();
                    return Err(e);
                }
            }
        }
        writer.close();
        writer.finished().await.map_err(publish_error)?;

        Ok(Some(missing.len()))
    }

    /// Run [`schedule`](Self::schedule) for `env` every `every`
    ///
    /// Replaces any timer already set for `env`. `None` clears it.
    pub fn set_interval(self: &Arc<Self>, env: &str, every: Option<Duration>) {
        let Some(every) = every else {
            self.clear(Some(env));
            return;
        };

        let scheduler: Weak<Self> = Arc::downgrade(self);
        let timer_env = env.to_string();
        let timer = Timer::spawn(every, move || {
            let scheduler = scheduler.clone();
            let env = timer_env.clone();
            async move {
                if let Some(scheduler) = scheduler.upgrade() {
                    scheduler.tick(&env).await;
                }
            }
        });

        tracing::info!(env = %env, every_ms = every.as_millis() as u64, "Catch-up timer set");
        self.timers().insert(env.to_string(), timer);
    }

    async fn tick(&self, env: &str) {
        let _ = self.events.send(SchedulerEvent::Schedule {
            env: env.to_string(),
        });
        let result = self.schedule(env).await;
        if let Err(e) = &result {
            tracing::error!(env = %env, "Catch-up scheduling failed: {}", e);
        }
        let _ = self.events.send(SchedulerEvent::Scheduled {
            env: env.to_string(),
            result,
        });
    }

    /// Stop the timer for `env`, or every timer when `None`
    pub fn clear(&self, env: Option<&str>) {
        let mut timers = self.timers();
        match env {
            Some(env) => {
                if timers.remove(env).is_some() {
                    tracing::info!(env = %env, "Catch-up timer cleared");
                }
            }
            None => {
                tracing::info!(count = timers.len(), "Clearing all catch-up timers");
                timers.clear();
            }
        }
    }

    /// Environments with an active timer
    pub fn environments(&self) -> Vec<String> {
        let mut envs: Vec<_> = self.timers().keys().cloned().collect();
        envs.sort();
        envs
    }

    fn timers(&self) -> std::sync::MutexGuard<'_, HashMap<String, Timer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CatchUpScheduler {
    fn drop(&mut self) {
        self.clear(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::queue::Unconfigured;
    use crate::registry::{BuildHead, MemoryStore};

    fn store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.insert_cached(CachedPackage {
            name: "p".to_string(),
            build_type: Some("webpack".to_string()),
        });
        for (locale, version) in [("it", "1.0.0"), ("en", "1.1.0")] {
            store.insert_head(BuildHead {
                name: "p".to_string(),
                env: "test".to_string(),
                version: version.to_string(),
                locale: locale.to_string(),
            });
        }
        Arc::new(store)
    }

    fn options() -> SchedulerOptions {
        SchedulerOptions {
            topic: "build".to_string(),
            throttle: 2,
            retry: RetryPolicy::bounded(0, Duration::from_millis(1), Duration::from_millis(1)),
        }
    }

    #[tokio::test]
    async fn test_publish_failure_is_isolated() {
        let store = store();
        let scheduler = CatchUpScheduler::new(store.clone(), store, Arc::new(Unconfigured), options());

        let report = scheduler.schedule("test").await.unwrap();

        assert!(report.counts.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], SchedulerError::Publish { .. }));
    }

    #[tokio::test]
    async fn test_environment_aliases_share_heads() {
        let store = store();
        let scheduler = CatchUpScheduler::new(store.clone(), store, Arc::new(Unconfigured), options());

        let report = scheduler.schedule("staging").await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0],
            SchedulerError::Publish { name, .. } if name == "p"
        ));
    }

    #[tokio::test]
    async fn test_packages_without_heads_are_skipped() {
        let store = store();
        let scheduler = CatchUpScheduler::new(store.clone(), store, Arc::new(Unconfigured), options());

        let report = scheduler.schedule("prod").await.unwrap();

        assert!(report.counts.is_empty());
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_clear_timers() {
        let store = store();
        let scheduler = Arc::new(CatchUpScheduler::new(
            store.clone(),
            store,
            Arc::new(Unconfigured),
            options(),
        ));

        scheduler.set_interval("test", Some(Duration::from_secs(60)));
        scheduler.set_interval("prod", Some(Duration::from_secs(60)));
        assert_eq!(scheduler.environments(), vec!["prod", "test"]);

        scheduler.clear(Some("test"));
        assert_eq!(scheduler.environments(), vec!["prod"]);

        scheduler.set_interval("prod", None);
        assert!(scheduler.environments().is_empty());
    }
}
