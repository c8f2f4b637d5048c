//! `DeterministicEmbedder` — a seedless, hash-based embedder for tests
//! that needs no network. Every call is pure and repeatable.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::{EmbedError, Embedder};

/// Hashes `text` with SHA-256 and expands the digest into `dim` floats in
/// `[-1.0, 1.0]` by repeatedly re-hashing. Same text always yields the
/// same vector; different text yields (with overwhelming probability) a
/// different one — good enough for exercising cosine similarity in tests
/// without a real model.
pub struct DeterministicEmbedder {
    dim: usize,
}

impl DeterministicEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

impl Default for DeterministicEmbedder {
    fn default() -> Self {
        Self::new(16)
    }
}

#[async_trait]
impl Embedder for DeterministicEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut out = Vec::with_capacity(self.dim);
        let mut block = Sha256::digest(text.as_bytes());
        while out.len() < self.dim {
            for byte in block.iter() {
                if out.len() == self.dim {
                    break;
                }
                out.push((*byte as f32 / 255.0) * 2.0 - 1.0);
            }
            block = Sha256::digest(block);
        }
        Ok(out)
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dim)
    }
}
