//! Infrastructure layer
//!
//! Handles all I/O operations: message queue, object storage, filesystem,
//! archives and the dependency installer process.

pub mod archive;
pub mod dirs;
pub mod filesystem;
pub mod installer;
pub mod npmrc;
pub mod queue;
pub mod retry;
pub mod services;
pub mod storage;
pub mod workdir;
