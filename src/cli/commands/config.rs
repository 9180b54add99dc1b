//! CLI command for `carpenter config`
//!
//! Shows the effective settings, defaults filled in.

use anyhow::Result;

use crate::cli::context::ServiceContext;
use crate::cli::output::{print_json, OutputConfig};
use crate::config::Settings;

/// Execute config command
pub fn execute(context: &ServiceContext, path_only: bool) -> Result<()> {
    let path = &context.config_path;
    if path_only {
        if !print_json(&serde_json::json!({ "path": path })) {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let effective = effective(&context.settings);
    if print_json(&effective) {
        return Ok(());
    }

    if !OutputConfig::global().quiet {
        println!("# {}{}", path.display(), if path.exists() { "" } else { " (not found, defaults)" });
        println!(
            "# carpenter {} ({}, built {})",
            env!("CARGO_PKG_VERSION"),
            option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
            option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown")
        );
        print!("{}", effective.to_toml()?);
    }
    Ok(())
}

/// Settings with every accessor default written out
pub fn effective(settings: &Settings) -> Settings {
    let mut effective = settings.clone();
    effective.env = Some(settings.env().to_string());
    effective.throttle = Some(settings.throttle());
    effective.max_failures = Some(settings.max_failures());
    effective.timeout_ms = Some(u64::try_from(settings.timeout().as_millis()).unwrap_or(u64::MAX));
    effective.interval_ms = Some(u64::try_from(settings.interval().as_millis()).unwrap_or(u64::MAX));
    effective.target = Some(settings.target_root());
    effective.install = Some(settings.install_root());
    effective.tarballs = Some(settings.tarball_root());
    effective.topic = Some(settings.topic().to_string());
    effective.status_topic = Some(settings.status_topic().to_string());
    effective
}
