//! Default configuration values

/// Topic build jobs are published to
pub const BUILD_TOPIC: &str = "build";

/// Topic status events are published to
pub const STATUS_TOPIC: &str = "build-status";

/// Environment the service runs in
pub const SERVICE_ENV: &str = "production";

/// Catch-up scheduler concurrency
pub const THROTTLE: usize = 5;

/// Catch-up interval (in milliseconds)
pub const SCHEDULE_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// Installer retries after the first attempt
pub const INSTALL_RETRIES: u32 = 1;

/// Installer backoff floor (in milliseconds)
pub const INSTALL_RETRY_MIN_MS: u64 = 500;

/// Installer backoff cap (in milliseconds)
pub const INSTALL_RETRY_MAX_MS: u64 = 2000;

/// Locale dispatch retries after the first attempt
pub const DISPATCH_RETRIES: u32 = 2;

/// Backoff floor for queue publishes (in milliseconds)
pub const PUBLISH_RETRY_MIN_MS: u64 = 300;

/// Backoff cap for queue publishes (in milliseconds)
pub const PUBLISH_RETRY_MAX_MS: u64 = 5000;

/// Failed locale dispatches tolerated per name/env/version
pub const MAX_FAILURES: u32 = 2;

/// Build timeout, also the purge cadence (in milliseconds)
pub const TIMEOUT_MS: u64 = 15 * 60 * 1000;

/// Added to the configured retries to get the purge age multiplier
pub const PURGE_RETRY_PADDING: u32 = 5;

/// Steps registered for every locale dispatch ("queuing" + "queued")
pub const DISPATCH_STEPS: u32 = 2;

/// Locale used when no locales can be derived
pub const DEFAULT_LOCALE: &str = "en-US";

/// npm log level written to the isolated npmrc
pub const NPM_LOGLEVEL: &str = "info";

/// Public npm registry
pub const NPM_REGISTRY: &str = "https://registry.npmjs.org";

/// Cache TTL for dependency manifests (in seconds)
pub const REGISTRY_CACHE_TTL: u64 = 3600; // 1 hour
