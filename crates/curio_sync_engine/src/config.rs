//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration shared by the background push engine and the
/// reconciliation engine.
///
/// Retry uses a fixed interval rather than exponential backoff: push
/// failures are rare and idempotent to retry, and the periodic pass is
/// the sole recovery mechanism.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval of the periodic push pass.
    pub retry_interval: Duration,
    /// Maximum records pushed per pass.
    pub push_batch_size: u32,
    /// Maximum records requested per pull page.
    pub pull_batch_size: u32,
}

impl SyncConfig {
    /// Creates a configuration with the design defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            retry_interval: Duration::from_secs(60),
            push_batch_size: 50,
            pull_batch_size: 100,
        }
    }

    /// Sets the periodic retry interval.
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Sets the push batch size.
    #[must_use]
    pub fn with_push_batch_size(mut self, size: u32) -> Self {
        self.push_batch_size = size;
        self
    }

    /// Sets the pull batch size.
    #[must_use]
    pub fn with_pull_batch_size(mut self, size: u32) -> Self {
        self.pull_batch_size = size;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
