//! Unique hostname allocation.
//!
//! Every prefix owns a counter that starts at zero and only ever grows, so a
//! hostname handed out once is never handed out again for the lifetime of
//! the allocator, even after the node that carried it is gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// Issues monotonically increasing indices per hostname prefix.
#[derive(Debug, Default)]
pub struct NameAllocator {
    counters: Mutex<HashMap<String, u64>>,
}

impl NameAllocator {
    /// Creates an allocator with no prefixes seen yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The allocator shared by every cluster in this process that was not
    /// given one explicitly.
    pub fn process() -> Arc<Self> {
        static PROCESS: OnceLock<Arc<NameAllocator>> = OnceLock::new();
        Arc::clone(PROCESS.get_or_init(|| Arc::new(Self::new())))
    }

    /// Returns the next index for `prefix`: 0 on first use, then +1 per call.
    pub fn next_index(&self, prefix: &str) -> u64 {
        // A single read-increment cannot leave the map half-updated, so a
        // poisoned lock is still consistent.
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = counters.entry(prefix.to_string()).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }

    /// Allocates the next hostname, formatted as `{prefix}-{index}`.
    pub fn next_name(&self, prefix: &str) -> String {
        let name = format!("{prefix}-{}", self.next_index(prefix));
        tracing::debug!(prefix, hostname = %name, "allocated hostname");
        name
    }

    /// Allocates `count` hostnames in one go, in allocation order.
    pub fn next_names(&self, prefix: &str, count: usize) -> Vec<String> {
        (0..count).map(|_| self.next_name(prefix)).collect()
    }
}
