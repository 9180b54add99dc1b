//! CLI command for `carpenter schedule`

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::context::ServiceContext;
use crate::cli::output::{create_spinner, print_json, print_status, status};

/// Execute one catch-up run for `env`
pub async fn execute(context: &ServiceContext, env: &str, store: &Path) -> Result<()> {
    let store = ServiceContext::snapshot(store)?;
    let scheduler = context.scheduler(&store);

    let spinner = create_spinner(&format!("Scheduling catch-up builds for {env}..."));
    let result = scheduler.schedule(env).await;
    spinner.finish_and_clear();
    let report = result.with_context(|| format!("Catch-up scheduling for {env} failed"))?;

    let failures: Vec<String> = report.failures.iter().map(ToString::to_string).collect();
    if print_json(&serde_json::json!({
        "env": env,
        "counts": report.counts,
        "failures": failures,
    })) {
        return Ok(());
    }

    if report.counts.is_empty() && failures.is_empty() {
        print_status(status::INFO, &format!("No packages with build heads in {env}"));
    }
    for (name, count) in &report.counts {
        print_status(status::SUCCESS, &format!("{name}: {count} build(s) queued"));
    }
    for failure in &failures {
        print_status(status::WARNING, failure);
    }
    print_status(
        status::INFO,
        &format!("{} catch-up build(s) queued for {env}", report.total()),
    );
    Ok(())
}
