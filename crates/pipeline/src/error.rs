use thiserror::Error;

/// Top-level pipeline error, composed so callers can match the taxonomy
/// names regardless of which concrete seam (store, index,
/// embedder, executor) raised it.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] mycelian_model::ValidationError),
    #[error(transparent)]
    Store(#[from] mycelian_store::StoreError),
    #[error(transparent)]
    Index(#[from] mycelian_index::IndexError),
    #[error(transparent)]
    Embed(#[from] mycelian_embedding::EmbedError),
    #[error("submit rejected: {0}")]
    Executor(#[from] mycelian_executor::ExecutorError),
    #[error("job failed: {0}")]
    JobFailed(#[from] mycelian_executor::AckError),
    #[error("await consistency timed out after {0:?}")]
    ConsistencyTimeout(std::time::Duration),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
