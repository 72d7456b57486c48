//! Configuration for the admission controller and materialization worker.

use flashsale_core::retry::RetryPolicy;
use std::time::Duration;

/// Default stream carrying admitted purchases.
pub const DEFAULT_STREAM: &str = "stream.orders";

/// Default consumer group name.
pub const DEFAULT_GROUP: &str = "orders";

/// Configuration for [`AdmissionController`](crate::AdmissionController).
///
/// Lock timings follow the original sale constants: wait 1s for a contended
/// voucher, hold a 10s lease (renewed while the critical section runs).
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Stream admitted purchases are published to.
    pub stream: String,
    /// How long to wait for the per-voucher lock before giving up.
    pub lock_wait: Duration,
    /// Lease duration on the per-voucher lock.
    pub lock_lease: Duration,
    /// TTL for cached voucher metadata.
    pub cache_ttl: Duration,
    /// TTL for the "voucher does not exist" sentinel. Short, so a newly
    /// published voucher becomes purchasable quickly.
    pub null_cache_ttl: Duration,
    /// Retry policy for publishing an admitted purchase to the stream.
    pub publish_retry: RetryPolicy,
}

impl AdmissionConfig {
    /// Create a config with production defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stream: DEFAULT_STREAM.to_string(),
            lock_wait: Duration::from_secs(1),
            lock_lease: Duration::from_secs(10),
            cache_ttl: Duration::from_secs(30 * 60),
            null_cache_ttl: Duration::from_secs(2 * 60),
            publish_retry: RetryPolicy::default(),
        }
    }

    /// Set the stream name.
    #[must_use]
    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = stream.into();
        self
    }

    /// Set the lock wait timeout.
    #[must_use]
    pub const fn with_lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Set the lock lease duration.
    #[must_use]
    pub const fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    /// Set the voucher cache TTL.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the absent-voucher sentinel TTL.
    #[must_use]
    pub const fn with_null_cache_ttl(mut self, ttl: Duration) -> Self {
        self.null_cache_ttl = ttl;
        self
    }

    /// Set the publish retry policy.
    #[must_use]
    pub fn with_publish_retry(mut self, policy: RetryPolicy) -> Self {
        self.publish_retry = policy;
        self
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for [`MaterializationWorker`](crate::MaterializationWorker).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Stream to consume admitted purchases from.
    pub stream: String,
    /// Consumer group name.
    pub group: String,
    /// This worker's consumer name within the group.
    pub consumer: String,
    /// How long each read blocks waiting for a new entry.
    pub block_timeout: Duration,
    /// Backoff pacing after a failed persist or recovery pass.
    pub failure_backoff: RetryPolicy,
}

impl WorkerConfig {
    /// Create a config with production defaults for a named consumer.
    #[must_use]
    pub fn new(consumer: impl Into<String>) -> Self {
        Self {
            stream: DEFAULT_STREAM.to_string(),
            group: DEFAULT_GROUP.to_string(),
            consumer: consumer.into(),
            block_timeout: Duration::from_secs(2),
            failure_backoff: RetryPolicy::builder()
                .initial_delay(Duration::from_millis(100))
                .multiplier(2.0)
                .max_delay(Duration::from_secs(5))
                .build(),
        }
    }

    /// Set the stream name.
    #[must_use]
    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = stream.into();
        self
    }

    /// Set the consumer group name.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Set the blocking-read timeout.
    #[must_use]
    pub const fn with_block_timeout(mut self, timeout: Duration) -> Self {
        self.block_timeout = timeout;
        self
    }

    /// Set the failure backoff policy.
    #[must_use]
    pub fn with_failure_backoff(mut self, policy: RetryPolicy) -> Self {
        self.failure_backoff = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_defaults_match_sale_constants() {
        let config = AdmissionConfig::new();
        assert_eq!(config.stream, "stream.orders");
        assert_eq!(config.lock_wait, Duration::from_secs(1));
        assert_eq!(config.lock_lease, Duration::from_secs(10));
    }

    #[test]
    fn worker_builder_overrides() {
        let config = WorkerConfig::new("c1")
            .with_stream("stream.test")
            .with_group("g-test")
            .with_block_timeout(Duration::from_millis(50));

        assert_eq!(config.stream, "stream.test");
        assert_eq!(config.group, "g-test");
        assert_eq!(config.consumer, "c1");
        assert_eq!(config.block_timeout, Duration::from_millis(50));
    }
}
