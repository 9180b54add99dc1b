//! CLI command for `carpenter purge`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::context::ServiceContext;
use crate::cli::output::{print_json, print_status, status};
use crate::core::purge;

/// Execute a single purge pass
pub async fn execute(
    context: &ServiceContext,
    target: Option<PathBuf>,
    max_age: Option<u64>,
) -> Result<()> {
    let target = target.unwrap_or_else(|| context.settings.target_root());
    let max_age = max_age.map_or_else(|| context.settings.purge_age(), Duration::from_secs);

    let removed = purge::purge(&target, max_age)
        .await
        .with_context(|| format!("Failed to purge {}", target.display()))?;

    if !print_json(&serde_json::json!({ "target": target, "removed": removed })) {
        print_status(
            status::SUCCESS,
            &format!("Purged {removed} stale entr{} from {}", if removed == 1 { "y" } else { "ies" }, target.display()),
        );
    }
    Ok(())
}
