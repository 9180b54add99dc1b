//! Build pipeline
//!
//! Everything between a publish event and the build topic. Network, process
//! and filesystem access goes through the traits in [`crate::infra`] and
//! [`crate::registry`].
//!
//! # Submodules
//!
//! - [`spec`] - Build spec, environment and dispatch record types
//! - [`payload`] - Publish payload parsing
//! - [`fitting`] - Build type classification of a manifest
//! - [`resolver`] - Spec resolution including dependency locales
//! - [`packer`] - Tarball download or unpack/install/repack
//! - [`progress`] - Local progress stream
//! - [`status`] - Durable status records
//! - [`failures`] - Per-spec dispatch failure tally
//! - [`orchestrator`] - Locale fan-out and the purge janitor
//! - [`lookup`] - Build heads behind the latest version
//! - [`scheduler`] - Catch-up scheduling
//! - [`purge`] - Stale target entry removal
//! - [`timer`] - Repeating background timers

pub mod failures;
pub mod fitting;
pub mod lookup;
pub mod orchestrator;
pub mod packer;
pub mod payload;
pub mod progress;
pub mod purge;
pub mod resolver;
pub mod scheduler;
pub mod spec;
pub mod status;
pub mod timer;
