//! CLI command for `carpenter build`
//!
//! Runs one publish payload through the orchestrator and streams the
//! progress lines to stdout.

use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::context::ServiceContext;
use crate::cli::output::{print_json, print_status, status, OutputConfig};
use crate::core::orchestrator::{BuildHandle, BuildOutcome};
use crate::core::payload::{BuildRequest, PublishPayload};
use crate::core::progress::ProgressReporter;

/// How long to wait for status records to reach the queue
const STATUS_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Build command options
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub payload: PathBuf,
    pub promote: bool,
    pub store: Option<PathBuf>,
}

/// Execute the build command
pub async fn execute(context: &ServiceContext, options: BuildOptions) -> Result<()> {
    let content = std::fs::read_to_string(&options.payload)
        .with_context(|| format!("Failed to read payload {}", options.payload.display()))?;
    let payload = PublishPayload::from_json(&content)
        .with_context(|| format!("Invalid payload {}", options.payload.display()))?;

    let snapshot = options
        .store
        .as_deref()
        .map(ServiceContext::snapshot)
        .transpose()?;
    let orchestrator = context.orchestrator(context.packages(snapshot.as_ref()))?;

    let handle = orchestrator.build(BuildRequest {
        promote: options.promote,
        payload,
    });
    let outcome = follow(handle).await.context("Build failed")?;

    match outcome {
        BuildOutcome::Ignored => {
            if !print_json(&serde_json::json!({ "outcome": "ignored" })) {
                print_status(status::INFO, "No build required");
            }
        }
        BuildOutcome::Queued { dispatched } => {
            if !print_json(&serde_json::json!({ "outcome": "queued", "dispatched": dispatched })) {
                print_status(status::SUCCESS, &format!("Queued {dispatched} build(s)"));
            }
        }
    }
    Ok(())
}

/// Print progress lines until the build settles, then drain status records
pub async fn follow(handle: BuildHandle) -> Result<BuildOutcome, crate::error::BuildError> {
    let BuildHandle {
        mut progress,
        completion,
    } = handle;
    let reporter = Arc::clone(completion.reporter());
    let quiet = OutputConfig::global().quiet;

    while let Some(line) = progress.next().await {
        if !quiet {
            print!("{line}");
        }
    }

    let outcome = completion.wait().await;
    drain_status(&reporter).await;
    outcome
}

async fn drain_status(reporter: &ProgressReporter) {
    match tokio::time::timeout(STATUS_DRAIN_TIMEOUT, reporter.status().finished()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Status records were not published: {}", e),
        Err(_) => tracing::warn!(
            "Gave up waiting for status records after {}s",
            STATUS_DRAIN_TIMEOUT.as_secs()
        ),
    }
}
