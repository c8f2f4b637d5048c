use thiserror::Error;

/// Error taxonomy for the shard executor.
#[derive(Debug, Error, Clone)]
pub enum ExecutorError {
    /// The shard's bounded queue was still full after `submitTimeout`
    /// elapsed. Carries `(shard, length, capacity)` for diagnostics.
    #[error("shard {shard} queue full ({length}/{capacity})")]
    QueueFull {
        shard: usize,
        length: usize,
        capacity: usize,
    },

    /// `submit` was called after `close` — terminal, not retryable.
    #[error("executor closed")]
    Closed,

    /// The submitter's cancellation fired before the job reached the
    /// queue. The job was never enqueued.
    #[error("submit cancelled before enqueue")]
    CancelledBeforeEnqueue,
}

impl ExecutorError {
    pub fn is_queue_full(&self) -> bool {
        matches!(self, ExecutorError::QueueFull { .. })
    }
}

/// The result a job reports back through its ack. `transient` jobs are
/// retried by the worker up to `maxAttempts`; once attempts
/// are exhausted, or the job reports a non-transient failure, the error
/// becomes terminal and is delivered to the ack as-is.
#[derive(Debug)]
pub struct JobFailure {
    pub error: anyhow::Error,
    pub transient: bool,
}

impl JobFailure {
    pub fn transient(error: impl Into<anyhow::Error>) -> Self {
        Self {
            error: error.into(),
            transient: true,
        }
    }

    pub fn terminal(error: impl Into<anyhow::Error>) -> Self {
        Self {
            error: error.into(),
            transient: false,
        }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for JobFailure {}

/// The outcome delivered through a job's ack: either success, or the
/// terminal error after retries were exhausted, or cancellation of the
/// ack wait itself.
#[derive(Debug, Error)]
pub enum AckError {
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
    #[error("executor closed before job completed")]
    ExecutorClosed,
    #[error("ack wait cancelled by caller")]
    Cancelled,
}
