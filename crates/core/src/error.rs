use thiserror::Error;

/// Top-level error for [`crate::MycelianCore`], composing every seam's
/// taxonomy so a caller only needs to match one enum regardless of
/// whether a call touched validation, the store, the pipeline, or
/// search.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] mycelian_model::ValidationError),
    #[error(transparent)]
    Store(#[from] mycelian_store::StoreError),
    #[error(transparent)]
    Pipeline(#[from] mycelian_pipeline::PipelineError),
    #[error(transparent)]
    Search(#[from] mycelian_search::SearchError),
}
