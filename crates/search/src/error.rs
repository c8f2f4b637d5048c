use thiserror::Error;

/// Failure taxonomy for the search engine. Each variant carries the
/// exact caller-visible category (400 vs 500) so a thin HTTP layer above
/// this crate (out of scope here) can translate it without re-deriving
/// the mapping.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query must be non-empty")]
    EmptyQuery,
    #[error("alpha must be between 0.0 and 1.0")]
    InvalidAlpha,
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(#[source] mycelian_embedding::EmbedError),
    #[error("search service unavailable: {0}")]
    SearchServiceUnavailable(#[source] mycelian_index::IndexError),
    #[error("tenant not found")]
    TenantNotFound,
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl SearchError {
    /// `true` for the validation-class errors (400), plus
    /// `TenantNotFound`; everything else is 500-class.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            SearchError::EmptyQuery | SearchError::InvalidAlpha | SearchError::TenantNotFound
        )
    }
}
