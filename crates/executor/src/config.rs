use std::time::Duration;

/// Enumerated executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of shard workers. A small constant independent of memory
    /// count — memory ids are hashed onto this many buckets.
    pub shards: usize,
    /// Per-shard bounded queue capacity.
    pub queue_capacity: usize,
    /// Max time `submit` waits for room in the shard queue before
    /// returning `QueueFull`.
    pub submit_timeout: Duration,
    /// Per-job retry count on transient failure.
    pub max_attempts: usize,
    /// Exponential-backoff envelope for job retries.
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shards: 8,
            queue_capacity: 256,
            submit_timeout: Duration::from_millis(500),
            max_attempts: 5,
            base_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}
