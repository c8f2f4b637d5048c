use thiserror::Error;

/// Error taxonomy for the search index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("index backend error: {0}")]
    Backend(#[from] anyhow::Error),
}
