//! `Index` — the hybrid search collaborator the search engine and write
//! pipeline depend on: a hybrid keyword+vector index over both entries
//! and context snapshots, scoped per memory.

mod error;
mod in_memory;
mod redb_index;
pub mod scoring;

pub use error::IndexError;
pub use in_memory::InMemoryIndex;
pub use redb_index::RedbIndex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mycelian_model::{ContextId, EntryId, MemoryId};
use serde::{Deserialize, Serialize};

/// What a [`SearchHit`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitKind {
    Entry,
    Context,
}

/// One scored search result. Carries only the id and score — callers
/// resolve the id against [`mycelian_store::DurableStore`] for the full
/// record, keeping this crate free of a dependency on the store crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub kind: HitKind,
    pub id: uuid::Uuid,
    pub score: f32,
}

/// Indexed representation of an entry's embeddable text plus vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedEntry {
    pub id: EntryId,
    pub memory_id: MemoryId,
    pub text: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// Indexed representation of a context snapshot's serialized body plus
/// vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedContext {
    pub id: ContextId,
    pub memory_id: MemoryId,
    pub text: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// The hybrid search index. All writes are idempotent upserts keyed by
/// entity id, matching "idempotent upsert" testable property —
/// re-indexing an id already present replaces its record rather than
/// duplicating it.
#[async_trait]
pub trait Index: Send + Sync {
    async fn upsert_entry(&self, indexed: IndexedEntry) -> Result<(), IndexError>;
    async fn remove_entry(&self, memory_id: MemoryId, entry_id: EntryId) -> Result<(), IndexError>;

    async fn upsert_context(&self, indexed: IndexedContext) -> Result<(), IndexError>;
    async fn remove_context(&self, memory_id: MemoryId, context_id: ContextId) -> Result<(), IndexError>;

    /// Presence check used by the consistency barrier's sentinel job to
    /// confirm a given write is observable before declaring the memory's
    /// shard caught up.
    async fn entry_exists(&self, memory_id: MemoryId, entry_id: EntryId) -> Result<bool, IndexError>;
    async fn context_exists(&self, memory_id: MemoryId, context_id: ContextId) -> Result<bool, IndexError>;

    /// Hybrid search over entries in `memory_id`. `query_embedding` may be
    /// empty when no embedder is configured, in which case the ranking
    /// falls back to pure keyword scoring regardless of `alpha`.
    async fn search_entries(
        &self,
        memory_id: MemoryId,
        query_text: &str,
        query_embedding: &[f32],
        top_k: usize,
        alpha: f32,
    ) -> Result<Vec<SearchHit>, IndexError>;

    async fn search_contexts(
        &self,
        memory_id: MemoryId,
        query_text: &str,
        query_embedding: &[f32],
        top_k: usize,
        alpha: f32,
    ) -> Result<Vec<SearchHit>, IndexError>;

    /// Total number of indexed entries across all memories, exposed for
    /// diagnostics.
    async fn len(&self) -> Result<usize, IndexError>;

    async fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len().await? == 0)
    }
}

/// Shared ranking routine used by both [`InMemoryIndex`] and [`RedbIndex`]:
/// score every candidate by BM25 and (when a query embedding is supplied)
/// cosine similarity, combine per `alpha`, sort descending, and truncate.
pub(crate) fn rank<'a, T>(
    candidates: &'a [T],
    text_of: impl Fn(&'a T) -> &'a str,
    embedding_of: impl Fn(&'a T) -> &'a [f32],
    query_text: &str,
    query_embedding: &[f32],
    top_k: usize,
    alpha: f32,
) -> Vec<(usize, f32)> {
    if candidates.is_empty() {
        return Vec::new();
    }
    let corpus: Vec<Vec<String>> = candidates.iter().map(|c| scoring::tokenize(text_of(c))).collect();
    let keyword = scoring::bm25_scores(query_text, &corpus);

    let effective_alpha = if query_embedding.is_empty() { 0.0 } else { alpha };
    let vector: Vec<f32> = if query_embedding.is_empty() {
        vec![0.0; candidates.len()]
    } else {
        candidates
            .iter()
            .map(|c| scoring::cosine_similarity(query_embedding, embedding_of(c)))
            .collect()
    };

    let combined = scoring::hybrid_scores(&keyword, &vector, effective_alpha);
    let mut scored: Vec<(usize, f32)> = combined.into_iter().enumerate().collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}
