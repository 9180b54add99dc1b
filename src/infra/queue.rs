//! Message queue publishing
//!
//! [`Publisher`] is the seam to the queue. [`NsqPublisher`] talks to an nsqd
//! HTTP endpoint. [`publish_with_retry`] applies a [`RetryPolicy`] to a single
//! publish, and [`RetryWriter`] is an ordered write stream that publishes each
//! record in the background with retries.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::PublishError;
use crate::infra::retry::{retry, RetryPolicy};

/// Publishes JSON messages to a topic
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one message, at least once
    async fn publish(&self, topic: &str, message: &Value) -> Result<(), PublishError>;
}

impl PublishError {
    /// Whether retrying the same publish can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Publisher used when no queue is configured; every publish fails
#[derive(Debug, Default, Clone, Copy)]
pub struct Unconfigured;

#[async_trait]
impl Publisher for Unconfigured {
    async fn publish(&self, _topic: &str, _message: &Value) -> Result<(), PublishError> {
        Err(PublishError::NotConfigured)
    }
}

/// nsqd HTTP publisher (`POST /pub?topic=<topic>`)
#[derive(Debug, Clone)]
pub struct NsqPublisher {
    client: reqwest::Client,
    url: String,
}

impl NsqPublisher {
    /// Create a publisher for the given nsqd HTTP endpoint
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            url: url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the nsqd endpoint
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Publisher for NsqPublisher {
    async fn publish(&self, topic: &str, message: &Value) -> Result<(), PublishError> {
        let body = serde_json::to_vec(message).map_err(|e| PublishError::Encode {
            topic: topic.to_string(),
            error: e.to_string(),
        })?;

        let response = self
            .client
            .post(format!("{}/pub", self.url))
            .query(&[("topic", topic)])
            .body(body)
            .send()
            .await
            .map_err(|e| PublishError::Failed {
                topic: topic.to_string(),
                error: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(PublishError::Failed {
                topic: topic.to_string(),
                error: format!("HTTP {}", response.status()),
            });
        }

        Ok(())
    }
}

/// Publish a message, retrying per `policy`
pub async fn publish_with_retry(
    publisher: &dyn Publisher,
    topic: &str,
    message: &Value,
    policy: &RetryPolicy,
) -> Result<(), PublishError> {
    retry(
        policy,
        &format!("publish to '{topic}'"),
        PublishError::is_retryable,
        || publisher.publish(topic, message),
    )
    .await
}

/// Ordered, retrying write stream onto one topic
///
/// Records are published in write order by a background task. Writes after
/// [`RetryWriter::end`] or [`RetryWriter::close`] are dropped.
#[derive(Debug)]
pub struct RetryWriter {
    topic: String,
    tx: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    task: tokio::sync::Mutex<Option<JoinHandle<Result<(), PublishError>>>>,
}

impl RetryWriter {
    /// Spawn the drain task; must be called inside a tokio runtime
    pub fn spawn(publisher: Arc<dyn Publisher>, topic: impl Into<String>, policy: RetryPolicy) -> Self {
        let topic = topic.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let drain_topic = topic.clone();

        let task = tokio::spawn(async move {
            let mut first_error = None;
            while let Some(record) = rx.recv().await {
                if let Err(e) =
                    publish_with_retry(publisher.as_ref(), &drain_topic, &record, &policy).await
                {
                    tracing::error!("Dropping record for topic '{}': {}", drain_topic, e);
                    first_error.get_or_insert(e);
                }
            }
            first_error.map_or(Ok(()), Err)
        });

        Self {
            topic,
            tx: Mutex::new(Some(tx)),
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }

    /// Topic this writer publishes to
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Queue a record; returns `false` if the writer has ended
    pub fn write(&self, record: Value) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().is_some_and(|tx| tx.send(record).is_ok())
    }

    /// Queue a final record and close the stream
    pub fn end(&self, record: Value) {
        let mut guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.take() {
            let _ = tx.send(record);
        }
    }

    /// Close the stream without a final record
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Whether the stream no longer accepts writes
    pub fn is_ended(&self) -> bool {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Wait until every queued record has been published
    ///
    /// Only meaningful after `end`/`close`. Returns the first publish error
    /// the stream gave up on. Later calls return `Ok(())`.
    pub async fn finished(&self) -> Result<(), PublishError> {
        let task = self.task.lock().await.take();
        match task {
            Some(handle) => handle.await.unwrap_or_else(|e| {
                Err(PublishError::Failed {
                    topic: self.topic.clone(),
                    error: e.to_string(),
                })
            }),
            None => Ok(()),
        }
    }
}
