//! Build progress reporting
//!
//! A [`ProgressReporter`] serves one publish event. It writes newline
//! delimited JSON lines to a local [`ProgressStream`] for the caller and
//! forwards every event except `start` to the durable [`StatusWriter`].
//! Each locale dispatch tracks its own step counter under a dispatch id.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use crate::core::status::{StatusEvent, StatusWriter, TerminalStatus};

/// Id used for lines not tied to a dispatch
pub const GENERIC_ID: &str = "generic";

/// One line of the progress stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: String,
    /// `task` or `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// `error` on the terminal failure line
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub message: String,
    /// Percentage, `-1` when the build was ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Milliseconds since the epoch
    pub timestamp: u64,
}

/// How a write affects the progress percentage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mark {
    /// No progress field
    #[default]
    None,
    /// Counts as one step of the dispatch
    Step,
    /// Reports a fixed value
    Fixed(i64),
}

/// Content of one write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Update {
    pub event: Option<&'static str>,
    pub kind: Option<&'static str>,
    pub message: String,
    pub progress: Mark,
    pub locale: Option<String>,
    pub details: Option<String>,
}

impl Update {
    /// Plain message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Set the locale
    #[must_use]
    pub fn locale(mut self, locale: Option<&str>) -> Self {
        self.locale = locale.map(str::to_string);
        self
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counter {
    completed: u32,
    total: u32,
}

/// Local line stream of one publish event
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::UnboundedReceiver<String>,
}

impl ProgressStream {
    /// Read every line until the reporter closes the stream
    pub async fn collect_lines(mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.rx.recv().await {
            lines.push(line);
        }
        lines
    }

    /// Read and parse every line until the reporter closes the stream
    pub async fn collect_events(self) -> Vec<ProgressEvent> {
        self.collect_lines()
            .await
            .iter()
            .filter_map(|line| serde_json::from_str(line.trim_end()).ok())
            .collect()
    }
}

impl Stream for ProgressStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.rx.poll_recv(cx)
    }
}

/// Dual-sink progress reporter for one publish event
#[derive(Debug)]
pub struct ProgressReporter {
    lines: Mutex<Option<mpsc::UnboundedSender<String>>>,
    counters: Mutex<HashMap<String, Counter>>,
    status: Arc<StatusWriter>,
    ended: AtomicBool,
}

impl ProgressReporter {
    /// Create a reporter and the stream its lines go to
    pub fn new(status: Arc<StatusWriter>) -> (Self, ProgressStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = Self {
            lines: Mutex::new(Some(tx)),
            counters: Mutex::new(HashMap::new()),
            status,
            ended: AtomicBool::new(false),
        };
        (reporter, ProgressStream { rx })
    }

    /// Durable status sink
    pub fn status(&self) -> &Arc<StatusWriter> {
        &self.status
    }

    /// Register a dispatch with `total` steps and write its start line
    pub fn start(&self, id: &str, total: u32, locale: Option<&str>) {
        self.counters()
            .insert(id.to_string(), Counter::default());
        if total > 0 {
            self.steps(id, total);
        }

        self.write(
            Some(id),
            Update {
                event: Some("task"),
                progress: Mark::Fixed(0),
                ..Update::message("start").locale(locale)
            },
        );
    }

    /// Add `n` steps to a dispatch
    pub fn steps(&self, id: &str, n: u32) {
        self.counters().entry(id.to_string()).or_default().total += n;
    }

    /// Write a line counting as one step of `id`
    pub fn step(&self, id: &str, message: impl Into<String>, locale: Option<&str>) {
        self.write(
            Some(id),
            Update {
                progress: Mark::Step,
                ..Update::message(message).locale(locale)
            },
        );
    }

    /// Mark a dispatch as queued
    pub fn done(&self, id: &str, locale: Option<&str>) {
        self.status.record_completed();
        self.counters().remove(id);
        self.write(
            Some(id),
            Update {
                event: Some("task"),
                progress: Mark::Fixed(100),
                ..Update::message("Successfully queued build").locale(locale)
            },
        );
    }

    /// Write an error line
    pub fn fail(&self, error: &dyn Display, id: Option<&str>, locale: Option<&str>) {
        if let Some(id) = id {
            self.counters().remove(id);
        }
        self.write(
            id,
            Update {
                event: Some("error"),
                ..Update::message(error.to_string()).locale(locale)
            },
        );
    }

    /// Terminal state for publishes that need no build
    pub fn ignore(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }

        self.counters().clear();
        self.status.end(TerminalStatus::Ignored, None);
        self.write(
            None,
            Update {
                event: Some("task"),
                progress: Mark::Fixed(-1),
                ..Update::message("ignored")
            },
        );
        self.close();
    }

    /// Terminal call for the whole publish event
    ///
    /// Only the first terminal call has any effect.
    pub fn end(&self, error: Option<&dyn Display>) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }

        let message = error.map(ToString::to_string);
        if let Some(message) = &message {
            let update = Update {
                kind: Some("error"),
                ..Update::message(message.clone())
            };
            self.write_line(self.render(None, update));
        }

        self.close();
        match message {
            Some(message) => self.status.end(TerminalStatus::Error, Some(&message)),
            None => self.status.end(TerminalStatus::Queued, None),
        }
    }

    /// Fail before any dispatch started and end the event
    pub fn abort(&self, error: &dyn Display) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }

        self.fail(error, None, None);
        self.close();
        self.status
            .end(TerminalStatus::Error, Some(&error.to_string()));
    }

    /// Whether a terminal call was made
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Percentage of a dispatch, 0 for unknown ids
    pub fn state(&self, id: &str) -> i64 {
        self.counters().get(id).map_or(0, |c| percentage(*c))
    }

    /// Write a line and forward it to the status sink
    pub fn write(&self, id: Option<&str>, update: Update) {
        let forward = update.message != "start";
        let event = self.render(id, update);

        if forward {
            let status = StatusEvent {
                message: event.message.clone(),
                locale: event.locale.clone(),
                details: event.details.clone(),
            };
            if event.event.as_deref() == Some("error") {
                self.status.write_error(status);
            } else {
                self.status.write(status);
            }
        }

        self.write_line(event);
    }

    fn render(&self, id: Option<&str>, update: Update) -> ProgressEvent {
        let progress = match update.progress {
            Mark::None => None,
            Mark::Fixed(value) => Some(value),
            Mark::Step => id.and_then(|id| {
                let mut counters = self.counters();
                let counter = counters.get_mut(id).filter(|c| c.total > 0)?;
                counter.completed += 1;
                Some(percentage(*counter))
            }),
        };

        ProgressEvent {
            id: id.unwrap_or(GENERIC_ID).to_string(),
            event: update.event.map(str::to_string),
            kind: update.kind.map(str::to_string),
            message: update.message,
            progress,
            locale: update.locale,
            details: update.details,
            timestamp: now_millis(),
        }
    }

    fn write_line(&self, event: ProgressEvent) {
        let guard = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            if let Ok(line) = serde_json::to_string(&event) {
                let _ = tx.send(line + "\n");
            }
        }
    }

    fn close(&self) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, HashMap<String, Counter>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn percentage(counter: Counter) -> i64 {
    if counter.total == 0 {
        return 0;
    }
    (f64::from(counter.completed) / f64::from(counter.total) * 100.0).round() as i64
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
