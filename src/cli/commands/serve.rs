//! CLI command for `carpenter serve`
//!
//! Keeps the purge janitor and one catch-up timer per environment running
//! until Ctrl-C.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::context::ServiceContext;
use crate::cli::output::{print_status, status};
use crate::core::orchestrator::OrchestratorEvent;
use crate::core::scheduler::SchedulerEvent;

/// Execute the serve command
pub async fn execute(
    context: &ServiceContext,
    store: Option<PathBuf>,
    envs: Vec<String>,
) -> Result<()> {
    let settings = &context.settings;
    let snapshot = store.as_deref().map(ServiceContext::snapshot).transpose()?;

    let orchestrator = context.orchestrator(context.packages(snapshot.as_ref()))?;
    let mut orchestrator_events = orchestrator.subscribe();
    let janitor = orchestrator.start_janitor();

    let envs = if envs.is_empty() {
        settings.schedule_envs.clone()
    } else {
        envs
    };

    let scheduler = match &snapshot {
        Some(store) => {
            let scheduler = context.scheduler(store);
            for env in &envs {
                scheduler.set_interval(env, Some(settings.interval()));
            }
            Some(scheduler)
        }
        None => {
            if !envs.is_empty() {
                tracing::warn!("No --store given; catch-up scheduling is disabled");
            }
            None
        }
    };
    let mut scheduler_events = scheduler.as_ref().map(|s| s.subscribe());

    print_status(
        status::INFO,
        &format!(
            "Serving (janitor {}, catch-up for [{}]); press Ctrl-C to stop",
            if janitor.is_some() { "on" } else { "off" },
            scheduler.as_ref().map(|s| s.environments().join(", ")).unwrap_or_default()
        ),
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            event = orchestrator_events.recv() => match event {
                Ok(event) => log_orchestrator_event(&event),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Dropped orchestrator events"),
                Err(RecvError::Closed) => break,
            },
            Some(event) = next_scheduler_event(&mut scheduler_events) => log_scheduler_event(&event),
        }
    }

    tracing::info!("Shutting down");
    if let Some(scheduler) = &scheduler {
        scheduler.clear(None);
    }
    if let Some(janitor) = janitor {
        janitor.shutdown().await;
    }
    print_status(status::SUCCESS, "Stopped");
    Ok(())
}

async fn next_scheduler_event(
    events: &mut Option<tokio::sync::broadcast::Receiver<SchedulerEvent>>,
) -> Option<SchedulerEvent> {
    let Some(rx) = events.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Dropped scheduler events"),
            Err(RecvError::Closed) => return None,
        }
    }
}

fn log_orchestrator_event(event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::Purge { removed } => tracing::info!(removed, "Purge finished"),
        OrchestratorEvent::PurgeFailed { error } => tracing::error!("Purge failed: {}", error),
        OrchestratorEvent::Queue { topic, record } | OrchestratorEvent::Queued { topic, record } => {
            tracing::debug!(topic = %topic, name = %record.name, locale = %record.locale, "{:?}", event);
        }
    }
}

fn log_scheduler_event(event: &SchedulerEvent) {
    match event {
        SchedulerEvent::Schedule { env } => tracing::info!(env = %env, "Catch-up run starting"),
        SchedulerEvent::Scheduled { env, result: Ok(report) } => {
            tracing::info!(
                env = %env,
                queued = report.total(),
                failed = report.failures.len(),
                "Catch-up run finished"
            );
        }
        SchedulerEvent::Scheduled { env, result: Err(e) } => {
            tracing::error!(env = %env, "Catch-up run failed: {}", e);
        }
    }
}
