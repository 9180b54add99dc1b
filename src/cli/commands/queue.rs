//! CLI command for `carpenter queue`

use anyhow::{Context, Result};

use crate::cli::commands::build::follow;
use crate::cli::context::ServiceContext;
use crate::cli::output::{print_json, print_status, status};
use crate::core::orchestrator::BuildOutcome;
use crate::core::spec::{BuildType, DispatchRecord, Env};

/// Queue command options
#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub name: String,
    pub version: String,
    pub locale: String,
    pub env: String,
    pub build_type: Option<String>,
    pub promote: bool,
}

impl QueueOptions {
    /// Dispatch record with a normalized environment
    pub fn record(&self) -> DispatchRecord {
        DispatchRecord {
            name: self.name.clone(),
            env: Env::normalize(Some(&self.env)).as_str().to_string(),
            version: self.version.clone(),
            locale: self.locale.clone(),
            build_type: self.build_type.clone(),
            promote: Some(self.promote),
        }
    }
}

/// Execute the queue command
pub async fn execute(context: &ServiceContext, options: QueueOptions) -> Result<()> {
    let record = options.record();
    let orchestrator = context.orchestrator(context.packages(None))?;

    let outcome = follow(orchestrator.build_one(record.clone()))
        .await
        .context("Queueing failed")?;

    let dispatched = match outcome {
        BuildOutcome::Queued { dispatched } => dispatched,
        BuildOutcome::Ignored => 0,
    };
    if dispatched == 0 {
        anyhow::bail!(
            "Build for {}@{} ({}) was not queued",
            record.name,
            record.version,
            record.locale
        );
    }

    if !print_json(&record) {
        print_status(
            status::SUCCESS,
            &format!(
                "Queued {} {}@{} for {} ({})",
                record.build_type.as_deref().unwrap_or(BuildType::Webpack.as_str()),
                record.name,
                record.version,
                record.locale,
                record.env
            ),
        );
    }
    Ok(())
}
