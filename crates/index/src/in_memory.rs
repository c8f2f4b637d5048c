//! In-memory [`Index`]: a map keyed by id plus a secondary per-scope
//! list, holding full records in RAM rather than behind `redb`, for use
//! in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use mycelian_model::{ContextId, EntryId, MemoryId};
use tokio::sync::RwLock;

use crate::{rank, HitKind, Index, IndexError, IndexedContext, IndexedEntry, SearchHit};

#[derive(Default)]
struct State {
    entries: HashMap<EntryId, IndexedEntry>,
    entries_by_memory: HashMap<MemoryId, Vec<EntryId>>,
    contexts: HashMap<ContextId, IndexedContext>,
    contexts_by_memory: HashMap<MemoryId, Vec<ContextId>>,
}

#[derive(Default)]
pub struct InMemoryIndex {
    state: RwLock<State>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Index for InMemoryIndex {
    async fn upsert_entry(&self, indexed: IndexedEntry) -> Result<(), IndexError> {
        let mut state = self.state.write().await;
        let memory_id = indexed.memory_id;
        let id = indexed.id;
        if !state.entries.contains_key(&id) {
            state.entries_by_memory.entry(memory_id).or_default().push(id);
        }
        state.entries.insert(id, indexed);
        Ok(())
    }

    async fn remove_entry(&self, memory_id: MemoryId, entry_id: EntryId) -> Result<(), IndexError> {
        let mut state = self.state.write().await;
        state.entries.remove(&entry_id);
        if let Some(ids) = state.entries_by_memory.get_mut(&memory_id) {
            ids.retain(|id| *id != entry_id);
        }
        Ok(())
    }

    async fn upsert_context(&self, indexed: IndexedContext) -> Result<(), IndexError> {
        let mut state = self.state.write().await;
        let memory_id = indexed.memory_id;
        let id = indexed.id;
        if !state.contexts.contains_key(&id) {
            state.contexts_by_memory.entry(memory_id).or_default().push(id);
        }
        state.contexts.insert(id, indexed);
        Ok(())
    }

    async fn remove_context(&self, memory_id: MemoryId, context_id: ContextId) -> Result<(), IndexError> {
        let mut state = self.state.write().await;
        state.contexts.remove(&context_id);
        if let Some(ids) = state.contexts_by_memory.get_mut(&memory_id) {
            ids.retain(|id| *id != context_id);
        }
        Ok(())
    }

    async fn search_entries(
        &self,
        memory_id: MemoryId,
        query_text: &str,
        query_embedding: &[f32],
        top_k: usize,
        alpha: f32,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let state = self.state.read().await;
        let candidates: Vec<IndexedEntry> = state
            .entries_by_memory
            .get(&memory_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.entries.get(id))
            .cloned()
            .collect();
        let ranked = rank(
            &candidates,
            |c| c.text.as_str(),
            |c| c.embedding.as_slice(),
            query_text,
            query_embedding,
            top_k,
            alpha,
        );
        Ok(ranked
            .into_iter()
            .map(|(i, score)| SearchHit {
                kind: HitKind::Entry,
                id: candidates[i].id,
                score,
            })
            .collect())
    }

    async fn search_contexts(
        &self,
        memory_id: MemoryId,
        query_text: &str,
        query_embedding: &[f32],
        top_k: usize,
        alpha: f32,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let state = self.state.read().await;
        let candidates: Vec<IndexedContext> = state
            .contexts_by_memory
            .get(&memory_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.contexts.get(id))
            .cloned()
            .collect();
        let ranked = rank(
            &candidates,
            |c| c.text.as_str(),
            |c| c.embedding.as_slice(),
            query_text,
            query_embedding,
            top_k,
            alpha,
        );
        Ok(ranked
            .into_iter()
            .map(|(i, score)| SearchHit {
                kind: HitKind::Context,
                id: candidates[i].id,
                score,
            })
            .collect())
    }

    async fn entry_exists(&self, _memory_id: MemoryId, entry_id: EntryId) -> Result<bool, IndexError> {
        Ok(self.state.read().await.entries.contains_key(&entry_id))
    }

    async fn context_exists(&self, _memory_id: MemoryId, context_id: ContextId) -> Result<bool, IndexError> {
        Ok(self.state.read().await.contexts.contains_key(&context_id))
    }

    async fn len(&self) -> Result<usize, IndexError> {
        Ok(self.state.read().await.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(memory_id: MemoryId, text: &str, embedding: Vec<f32>) -> IndexedEntry {
        IndexedEntry {
            id: Uuid::new_v4(),
            memory_id,
            text: text.to_string(),
            embedding,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_id() -> Result<(), IndexError> {
        let index = InMemoryIndex::new();
        let memory_id = Uuid::new_v4();
        let mut e = entry(memory_id, "hello world", vec![1.0, 0.0]);
        index.upsert_entry(e.clone()).await?;
        e.text = "hello world updated".to_string();
        index.upsert_entry(e.clone()).await?;

        assert_eq!(index.len().await?, 1);
        let hits = index.search_entries(memory_id, "updated", &[], 10, 0.5).await?;
        assert_eq!(hits.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn search_ranks_keyword_match_above_unrelated() -> Result<(), IndexError> {
        let index = InMemoryIndex::new();
        let memory_id = Uuid::new_v4();
        index
            .upsert_entry(entry(memory_id, "the quarterly roadmap review", vec![1.0, 0.0]))
            .await?;
        index
            .upsert_entry(entry(memory_id, "lunch order for the office", vec![0.0, 1.0]))
            .await?;

        let hits = index
            .search_entries(memory_id, "roadmap review", &[], 10, 0.5)
            .await?;
        assert_eq!(hits[0].score > hits[1].score, true);
        Ok(())
    }

    #[tokio::test]
    async fn remove_entry_drops_it_from_results() -> Result<(), IndexError> {
        let index = InMemoryIndex::new();
        let memory_id = Uuid::new_v4();
        let e = entry(memory_id, "roadmap", vec![1.0, 0.0]);
        index.upsert_entry(e.clone()).await?;
        index.remove_entry(memory_id, e.id).await?;
        assert_eq!(index.len().await?, 0);
        Ok(())
    }
}
