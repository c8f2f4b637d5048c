use thiserror::Error;

/// Error taxonomy for the embedding collaborator. Both variants map to
/// the search engine's "embedding service unavailable" 500-class error
/// and to a retried `Transient` job step in the write pipeline.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Request(#[from] anyhow::Error),
    #[error("embedding provider returned an empty or malformed vector")]
    EmptyResponse,
}
