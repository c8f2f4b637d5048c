//! `Embedder` — the collaborator the write pipeline and search engine use
//! to turn text into a dense vector. This crate defines the
//! trait plus two implementations: an HTTP-backed embedder calling an
//! Ollama-style `/api/embeddings` endpoint, and a deterministic
//! hash-based embedder for tests that needs no network.

mod deterministic;
mod error;
mod http;

pub use deterministic::DeterministicEmbedder;
pub use error::EmbedError;
pub use http::HttpEmbedder;

use async_trait::async_trait;

/// Maps `text -> dense vector`, with a stable dimension across calls.
/// Failures are surfaced as a typed error rather than swallowed, so the
/// search engine can distinguish "embedding service unavailable" from
/// other failure modes.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Dimension of vectors this embedder produces. Implementations that
    /// cannot know this ahead of a call may return `None`.
    fn dimension(&self) -> Option<usize> {
        None
    }
}
