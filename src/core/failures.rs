//! Per-spec dispatch failure tally
//!
//! Counts failed locale dispatches per `name!env!version` key. Owned by one
//! orchestrator and shared between its concurrent dispatches.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Failure counters keyed by spec key
#[derive(Debug, Default)]
pub struct FailureTally {
    counts: Mutex<HashMap<String, u32>>,
}

impl FailureTally {
    /// Create an empty tally
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one failure and return the new total
    pub fn record(&self, key: &str) -> u32 {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Forget a key
    pub fn reset(&self, key: &str) {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Current count for a key
    pub fn count(&self, key: &str) -> u32 {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}
