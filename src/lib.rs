//! Carpenter - package build orchestrator
//!
//! Turns registry publishes into per-locale build jobs on a message queue,
//! reuses or prepares the installed package tarball the workers build from,
//! and periodically catches lagging locales up to the newest version.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Build pipeline: spec resolution, orchestration, scheduling
//! - [`registry`] - Package, build head and package cache queries
//! - [`infra`] - Infrastructure layer (queue, storage, filesystem, processes)
//! - [`config`] - Settings and defaults
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;
pub mod registry;

#[cfg(test)]
pub mod test_utils;
