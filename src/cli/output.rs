//! Output formatting and progress indicators
//!
//! Human-readable summaries go to stdout unless `--quiet`; `--json` switches
//! summaries to one JSON object per line. Errors always go to stderr.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::OnceLock;

static OUTPUT: OnceLock<OutputConfig> = OnceLock::new();

/// Global output settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputConfig {
    pub quiet: bool,
    pub json: bool,
    pub verbose: u8,
}

impl OutputConfig {
    pub fn new(quiet: bool, json: bool, verbose: u8) -> Self {
        Self {
            quiet,
            json,
            verbose,
        }
    }

    /// Make this the process-wide configuration; first call wins
    pub fn apply_global(self) {
        let _ = OUTPUT.set(self);
    }

    /// Process-wide configuration, defaults when never applied
    pub fn global() -> Self {
        OUTPUT.get().copied().unwrap_or_default()
    }

    /// Whether spinners and decorated text should be shown
    pub fn is_interactive(&self) -> bool {
        !self.quiet && !self.json
    }
}

/// Print a summary line
pub fn print_status(prefix: &str, message: &str) {
    let output = OutputConfig::global();
    if output.quiet || output.json {
        return;
    }
    println!("{prefix} {message}");
}

/// Print a serializable summary when `--json` is set
///
/// Returns `true` if it was printed.
pub fn print_json<T: Serialize>(value: &T) -> bool {
    if !OutputConfig::global().json {
        return false;
    }
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!("Failed to encode output: {}", e),
    }
    true
}

/// Print an error and its causes to stderr
pub fn display_error(error: &anyhow::Error) {
    if OutputConfig::global().json {
        let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
        eprintln!(
            "{}",
            serde_json::json!({ "error": error.to_string(), "causes": causes })
        );
        return;
    }

    eprintln!("{} Error: {}", status::ERROR, error);
    for cause in error.chain().skip(1) {
        eprintln!("  caused by: {cause}");
    }
}

/// Create a spinner for operations with unknown duration
///
/// Hidden unless the output is interactive.
pub fn create_spinner(message: &str) -> ProgressBar {
    if !OutputConfig::global().is_interactive() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.blue} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}

/// Status message prefixes
pub mod status {
    /// Success prefix (green checkmark)
    pub const SUCCESS: &str = "✓";

    /// Error prefix (red X)
    pub const ERROR: &str = "✗";

    /// Warning prefix (yellow triangle)
    pub const WARNING: &str = "⚠";

    /// Info prefix (blue circle)
    pub const INFO: &str = "ℹ";
}
