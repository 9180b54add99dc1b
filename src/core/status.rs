//! Durable build status
//!
//! Publishes status records for external observers onto the status topic
//! through a [`RetryWriter`]. Without a publisher the writer is a no-op.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::core::spec::{BuildSpec, DispatchRecord};
use crate::error::PublishError;
use crate::infra::queue::{Publisher, RetryWriter};
use crate::infra::retry::RetryPolicy;

/// Terminal outcome of one publish event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalStatus {
    Ignored,
    Error,
    Queued,
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ignored => "ignored",
            Self::Error => "error",
            Self::Queued => "queued",
        })
    }
}

/// Identity stamped onto every status record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_type: Option<String>,
}

impl From<&BuildSpec> for StatusMetadata {
    fn from(spec: &BuildSpec) -> Self {
        Self {
            name: Some(spec.name.clone()),
            env: Some(spec.env.to_string()),
            version: Some(spec.version.clone()),
            build_type: spec.build_type.map(|t| t.to_string()),
        }
    }
}

impl From<&DispatchRecord> for StatusMetadata {
    fn from(record: &DispatchRecord) -> Self {
        Self {
            name: Some(record.name.clone()),
            env: Some(record.env.clone()),
            version: Some(record.version.clone()),
            build_type: record.build_type.clone(),
        }
    }
}

/// Event content of a status record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusEvent {
    pub message: String,
    pub locale: Option<String>,
    pub details: Option<String>,
}

impl StatusEvent {
    /// Event with only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// One record on the status topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    /// `event`, `error` or a terminal status
    pub event_type: String,
    #[serde(flatten)]
    pub metadata: StatusMetadata,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Milliseconds since the matching `write_start`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<u64>,
    /// Builds queued, on terminal records only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
}

/// Status topic writer for one publish event
#[derive(Debug, Default)]
pub struct StatusWriter {
    sink: Option<RetryWriter>,
    metadata: Mutex<StatusMetadata>,
    builds_completed: AtomicU32,
    timers: Mutex<HashMap<String, Instant>>,
}

impl StatusWriter {
    /// Writer publishing to `topic`, retrying per `policy`
    pub fn new(publisher: Arc<dyn Publisher>, topic: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            sink: Some(RetryWriter::spawn(publisher, topic, policy)),
            ..Self::default()
        }
    }

    /// Writer for an optional publisher; a no-op without one or with an empty topic
    pub fn connect(
        publisher: Option<Arc<dyn Publisher>>,
        topic: &str,
        policy: RetryPolicy,
    ) -> Self {
        match publisher {
            Some(publisher) if !topic.is_empty() => Self::new(publisher, topic, policy),
            _ => Self::disabled(),
        }
    }

    /// Writer that drops everything
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Replace the identity stamped onto records
    pub fn set_metadata(&self, metadata: StatusMetadata) {
        *self.metadata.lock().unwrap_or_else(PoisonError::into_inner) = metadata;
    }

    /// Count one more queued build
    pub fn record_completed(&self) -> u32 {
        self.builds_completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Builds queued so far
    pub fn builds_completed(&self) -> u32 {
        self.builds_completed.load(Ordering::SeqCst)
    }

    /// Whether records are still accepted
    pub fn is_writable(&self) -> bool {
        self.sink.as_ref().is_some_and(|sink| !sink.is_ended())
    }

    /// Write an `event` record
    pub fn write(&self, event: StatusEvent) {
        self.emit("event", event, None);
    }

    /// Write an `error` record
    pub fn write_error(&self, event: StatusEvent) {
        self.emit("error", event, None);
    }

    /// Start timing `key`, writing `message` (or the key itself)
    pub fn write_start(&self, key: &str, message: Option<&str>) {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), Instant::now());
        self.write(StatusEvent::message(message.unwrap_or(key)));
    }

    /// Stop timing `key` and write `event` with the elapsed milliseconds
    pub fn write_end(&self, key: &str, event: StatusEvent) {
        let started = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        let timing = started.map(|s| u64::try_from(s.elapsed().as_millis()).unwrap_or(u64::MAX));
        self.emit("event", event, timing);
    }

    /// Write the terminal record and close the stream
    pub fn end(&self, status: TerminalStatus, error: Option<&str>) {
        let Some(sink) = self.sink.as_ref().filter(|s| !s.is_ended()) else {
            return;
        };

        let record = StatusRecord {
            event_type: status.to_string(),
            metadata: self.metadata(),
            message: error.unwrap_or("Builds Queued").to_string(),
            locale: None,
            details: None,
            timing: None,
            total: Some(self.builds_completed()),
        };
        sink.end(to_value(&record));
    }

    /// Wait for every record to be published
    pub async fn finished(&self) -> Result<(), PublishError> {
        match &self.sink {
            Some(sink) => sink.finished().await,
            None => Ok(()),
        }
    }

    fn metadata(&self) -> StatusMetadata {
        self.metadata
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn emit(&self, event_type: &str, event: StatusEvent, timing: Option<u64>) {
        let Some(sink) = self.sink.as_ref().filter(|s| !s.is_ended()) else {
            return;
        };

        let record = StatusRecord {
            event_type: event_type.to_string(),
            metadata: self.metadata(),
            message: event.message,
            locale: event.locale,
            details: event.details,
            timing,
            total: None,
        };
        sink.write(to_value(&record));
    }
}

fn to_value(record: &StatusRecord) -> serde_json::Value {
    serde_json::to_value(record).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl Publisher for Recorder {
        async fn publish(&self, topic: &str, message: &Value) -> Result<(), PublishError> {
            self.seen.lock().unwrap().push((topic.to_string(), message.clone()));
            Ok(())
        }
    }

    fn writer() -> (Arc<Recorder>, StatusWriter) {
        let recorder = Arc::new(Recorder::default());
        let policy = RetryPolicy::infinite(Duration::from_millis(1), Duration::from_millis(2));
        let writer = StatusWriter::new(recorder.clone(), "build-status", policy);
        writer.set_metadata(StatusMetadata {
            name: Some("pkg".to_string()),
            env: Some("prod".to_string()),
            version: Some("1.0.0".to_string()),
            build_type: Some("webpack".to_string()),
        });
        (recorder, writer)
    }

    #[tokio::test]
    async fn test_connect_without_publisher_or_topic_is_disabled() {
        let policy = RetryPolicy::infinite(Duration::from_millis(1), Duration::from_millis(2));
        let recorder = Arc::new(Recorder::default());

        let missing = StatusWriter::connect(None, "build-status", policy);
        let empty = StatusWriter::connect(Some(recorder.clone()), "", policy);
        for writer in [&missing, &empty] {
            assert!(!writer.is_writable());
            writer.write(StatusEvent::message("dropped"));
            writer.end(TerminalStatus::Ignored, None);
            writer.finished().await.unwrap();
        }
        assert!(recorder.seen.lock().unwrap().is_empty());

        let connected = StatusWriter::connect(Some(recorder.clone()), "build-status", policy);
        assert!(connected.is_writable());
    }

    #[tokio::test]
    async fn test_records_carry_metadata() {
        let (recorder, writer) = writer();
        writer.write(StatusEvent {
            message: "Queuing webpack build pkg".to_string(),
            locale: Some("de".to_string()),
            details: None,
        });
        writer.write_error(StatusEvent::message("boom"));
        writer.record_completed();
        writer.end(TerminalStatus::Queued, None);
        writer.finished().await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert!(seen.iter().all(|(topic, _)| topic == "build-status"));
        assert_eq!(
            seen[0].1,
            json!({
                "eventType": "event",
                "name": "pkg",
                "env": "prod",
                "version": "1.0.0",
                "buildType": "webpack",
                "message": "Queuing webpack build pkg",
                "locale": "de"
            })
        );
        assert_eq!(seen[1].1["eventType"], "error");
        assert_eq!(seen[2].1["eventType"], "queued");
        assert_eq!(seen[2].1["total"], 1);
        assert_eq!(seen[2].1["message"], "Builds Queued");
    }

    #[tokio::test]
    async fn test_writes_after_end_are_dropped() {
        let (recorder, writer) = writer();
        writer.end(TerminalStatus::Error, Some("install failed"));
        assert!(!writer.is_writable());
        writer.write(StatusEvent::message("late"));
        writer.end(TerminalStatus::Queued, None);
        writer.finished().await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1["message"], "install failed");
    }

    #[tokio::test]
    async fn test_timed_writes() {
        let (recorder, writer) = writer();
        writer.write_start("unpacking", None);
        writer.write_end("unpacking", StatusEvent::message("unpacked"));
        writer.write_end("never started", StatusEvent::message("untimed"));
        writer.end(TerminalStatus::Queued, None);
        writer.finished().await.unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen[0].1["message"], "unpacking");
        assert!(seen[0].1.get("timing").is_none());
        assert!(seen[1].1["timing"].is_u64());
        assert!(seen[2].1.get("timing").is_none());
    }

    #[tokio::test]
    async fn test_disabled_writer_is_noop() {
        let writer = StatusWriter::disabled();
        assert!(!writer.is_writable());
        writer.write(StatusEvent::message("x"));
        writer.end(TerminalStatus::Ignored, None);
        writer.finished().await.unwrap();
    }
}
