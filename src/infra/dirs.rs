//! Platform-specific directory management
//!
//! Provides the config directory holding `config.toml` and the state
//! directory holding the generated npmrc. Follows XDG conventions on Linux.
//!
//! Environment variables can override default directories:
//! - `CARPENTER_CONFIG_DIR` - Override config directory
//! - `CARPENTER_STATE_DIR` - Override state directory

use std::env;
use std::path::PathBuf;

/// Environment variable names for directory overrides
pub const ENV_CONFIG_DIR: &str = "CARPENTER_CONFIG_DIR";
pub const ENV_STATE_DIR: &str = "CARPENTER_STATE_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "carpenter";

/// Platform-specific directory provider
#[derive(Debug, Clone)]
pub struct CarpenterDirs {
    config_dir: PathBuf,
    state_dir: PathBuf,
}

impl CarpenterDirs {
    /// Create a new `CarpenterDirs` instance
    ///
    /// Checks environment variables first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_dir: env::var(ENV_CONFIG_DIR)
                .map_or_else(|_| Self::platform_config_dir(), PathBuf::from),
            state_dir: env::var(ENV_STATE_DIR)
                .map_or_else(|_| Self::platform_state_dir(), PathBuf::from),
        }
    }

    /// Use explicit directories
    #[must_use]
    pub fn with_dirs(config_dir: PathBuf, state_dir: PathBuf) -> Self {
        Self {
            config_dir,
            state_dir,
        }
    }

    /// Get the config directory path
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    /// Get the state directory path
    ///
    /// - Linux: `$XDG_DATA_HOME/carpenter` or `~/.local/share/carpenter`
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone()
    }

    /// Get the config file path
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Get the path of the generated npmrc
    #[must_use]
    pub fn npmrc_path(&self) -> PathBuf {
        self.state_dir.join(".npmrc")
    }

    fn platform_config_dir() -> PathBuf {
        dirs::config_dir().map_or_else(
            || {
                dirs::home_dir()
                    .map(|h| h.join(".config").join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from(".").join(".config").join(APP_NAME))
            },
            |p| p.join(APP_NAME),
        )
    }

    fn platform_state_dir() -> PathBuf {
        dirs::data_dir().map_or_else(
            || {
                dirs::home_dir()
                    .map(|h| h.join(".local").join("share").join(APP_NAME))
                    .unwrap_or_else(|| PathBuf::from(".").join(".local").join("share").join(APP_NAME))
            },
            |p| p.join(APP_NAME),
        )
    }
}

impl Default for CarpenterDirs {
    fn default() -> Self {
        Self::new()
    }
}
