//! Search Engine — hybrid (keyword + vector) query over the
//! index, scoped to `(actorId, memoryId)`, joined with the latest and
//! best-matching context snapshot for that memory: score every
//! candidate, sort descending, take the winners, using the index
//! crate's BM25+cosine hybrid across both entry and context classes.
//!
//! Unlike the write pipeline, this engine is stateless: every call takes
//! its dependencies as borrowed references and holds nothing between
//! calls.

mod error;
mod request;

pub use error::SearchError;
pub use request::{EntryHit, SearchRequest, SearchResponse, DEFAULT_ALPHA, DEFAULT_TOP_K, MAX_TOP_K, MIN_TOP_K};

use std::sync::Arc;

use mycelian_embedding::Embedder;
use mycelian_index::Index;
use mycelian_model::Entry;
use mycelian_store::{DurableStore, StoreError};

/// Wires the three collaborators `Search` needs: `DurableStore`, `Index`,
/// `Embedder`.
pub struct SearchEngine {
    store: Arc<dyn DurableStore>,
    index: Arc<dyn Index>,
    embedder: Arc<dyn Embedder>,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn DurableStore>, index: Arc<dyn Index>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, index, embedder }
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, SearchError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let top_k = match request.top_k {
            None => DEFAULT_TOP_K,
            Some(k) => k.clamp(MIN_TOP_K, MAX_TOP_K),
        };
        let alpha = match request.alpha {
            None => DEFAULT_ALPHA,
            Some(a) if (0.0..=1.0).contains(&a) => a,
            Some(_) => return Err(SearchError::InvalidAlpha),
        };

        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(SearchError::EmbeddingUnavailable)?;

        let entry_hits = self
            .index
            .search_entries(request.memory_id, query, &embedding, top_k, alpha)
            .await
            .map_err(map_index_error)?;

        let best_context_hit = self
            .index
            .search_contexts(request.memory_id, query, &embedding, 1, alpha)
            .await
            .map_err(map_index_error)?
            .into_iter()
            .next();

        let latest_context = self
            .store
            .get_latest_context(request.memory_id)
            .await
            .map_err(map_store_error)?;

        // Resolve each hit against the durable store, carrying `created_at`
        // along for the tie-break below even though it isn't part of the
        // response shape.
        let mut resolved: Vec<(EntryHit, chrono::DateTime<chrono::Utc>)> = Vec::with_capacity(entry_hits.len());
        for hit in &entry_hits {
            match self.store.get_entry(request.memory_id, hit.id).await {
                Ok(entry) => {
                    let created_at = entry.created_at;
                    if let Some(hit) = scored(entry, hit.score, request.actor_id.as_str()) {
                        resolved.push((hit, created_at));
                    }
                }
                Err(StoreError::NotFound(_)) => {
                    // Entry was deleted after the index upserted it but before
                    // the best-effort index-delete landed; the
                    // durable store is authoritative, so drop the stale hit.
                    continue;
                }
                Err(e) => return Err(map_store_error(e)),
            }
        }

        // Tie-break step 6: (hybrid_score desc, creation_time
        // desc, id asc).
        resolved.sort_by(|(a, a_ts), (b, b_ts)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b_ts.cmp(a_ts))
                .then_with(|| a.entry_id.cmp(&b.entry_id))
        });
        let entries: Vec<EntryHit> = resolved.into_iter().map(|(hit, _)| hit).collect();

        let best_context = match best_context_hit {
            Some(hit) => {
                let ctx = self
                    .store
                    .get_context(request.memory_id, hit.id)
                    .await
                    .map_err(map_store_error)?;
                Some((serde_json::Value::Object(ctx.body), ctx.created_at, hit.score))
            }
            None => None,
        };

        let memory_has_contexts = latest_context.is_some() || best_context.is_some();
        if memory_has_contexts && (latest_context.is_none() || best_context.is_none()) {
            return Err(SearchError::InvariantViolation(
                "memory has at least one context snapshot but latest or best context resolved empty".into(),
            ));
        }

        let response = SearchResponse {
            count: entries.len(),
            entries,
            latest_context: latest_context
                .as_ref()
                .map(|c| serde_json::Value::Object(c.body.clone())),
            context_timestamp: latest_context.as_ref().map(|c| c.created_at),
            best_context: best_context.as_ref().map(|(body, _, _)| body.clone()),
            best_context_timestamp: best_context.as_ref().map(|(_, ts, _)| *ts),
            best_context_score: best_context.as_ref().map(|(_, _, score)| *score),
        };
        Ok(response)
    }
}

fn scored(entry: Entry, score: f32, expected_actor: &str) -> Option<EntryHit> {
    if entry.actor_id != expected_actor {
        return None;
    }
    Some(EntryHit {
        entry_id: entry.id,
        memory_id: entry.memory_id,
        summary: entry.summary,
        raw_entry: entry.raw_entry,
        score,
        tags: entry.tags,
    })
}

fn map_index_error(e: mycelian_index::IndexError) -> SearchError {
    match e {
        mycelian_index::IndexError::NotFound(_) => SearchError::TenantNotFound,
        other => SearchError::SearchServiceUnavailable(other),
    }
}

fn map_store_error(e: StoreError) -> SearchError {
    match e {
        StoreError::NotFound(_) => SearchError::TenantNotFound,
        other => SearchError::InvariantViolation(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mycelian_embedding::DeterministicEmbedder;
    use mycelian_index::{IndexedContext, IndexedEntry};
    use mycelian_store::InMemoryStore;

    async fn seeded_engine() -> (SearchEngine, mycelian_model::MemoryId, mycelian_model::ActorId) {
        let store: Arc<dyn DurableStore> = Arc::new(InMemoryStore::new());
        let index: Arc<dyn Index> = Arc::new(mycelian_index::InMemoryIndex::new());
        let embedder: Arc<dyn Embedder> = Arc::new(DeterministicEmbedder::new(16));

        let actor_id = "alice".to_string();
        let vault = store
            .create_vault(actor_id.clone(), "notes".to_string(), None)
            .await
            .unwrap();
        let memory = store
            .create_memory(vault.id, actor_id.clone(), "chat".to_string(), "conversation".to_string(), None)
            .await
            .unwrap();

        let ctx = store
            .create_context(memory.id, actor_id.clone(), {
                let mut b = mycelian_model::ContextBody::new();
                b.insert("activeContext".to_string(), serde_json::json!("integration context"));
                b
            })
            .await
            .unwrap();
        let ctx_embedding = embedder.embed("integration context").await.unwrap();
        index
            .upsert_context(IndexedContext {
                id: ctx.id,
                memory_id: memory.id,
                text: "integration context".to_string(),
                embedding: ctx_embedding,
                created_at: ctx.created_at,
            })
            .await
            .unwrap();

        for i in 0..3 {
            let text = format!("the quick brown fox {i}");
            let entry = store
                .create_entry(
                    memory.id,
                    actor_id.clone(),
                    text.clone(),
                    text.clone(),
                    None,
                    None,
                    None,
                    Some(ctx.id),
                )
                .await
                .unwrap();
            let embedding = embedder.embed(&text).await.unwrap();
            index
                .upsert_entry(IndexedEntry {
                    id: entry.id,
                    memory_id: memory.id,
                    text,
                    embedding,
                    created_at: entry.created_at,
                })
                .await
                .unwrap();
        }

        (SearchEngine::new(store, index, embedder), memory.id, actor_id)
    }

    #[tokio::test]
    async fn search_returns_entries_and_context_pair() {
        let (engine, memory_id, actor_id) = seeded_engine().await;
        let response = engine
            .search(SearchRequest::new(actor_id, memory_id, "fox").top_k(3))
            .await
            .unwrap();

        assert!(response.count >= 1);
        assert_eq!(
            response.latest_context.unwrap()["activeContext"],
            serde_json::json!("integration context")
        );
        assert!(response.context_timestamp.is_some());
        assert!(response.best_context.is_some());
        assert!(response.best_context_score.is_some());
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let (engine, memory_id, actor_id) = seeded_engine().await;
        let result = engine.search(SearchRequest::new(actor_id, memory_id, "   ")).await;
        assert!(matches!(result, Err(SearchError::EmptyQuery)));
    }

    #[tokio::test]
    async fn top_k_is_clamped_not_rejected() {
        let (engine, memory_id, actor_id) = seeded_engine().await;
        let response = engine
            .search(SearchRequest::new(actor_id, memory_id, "fox").top_k(10_000))
            .await
            .unwrap();
        assert!(response.count <= MAX_TOP_K);
    }

    #[tokio::test]
    async fn alpha_out_of_range_is_rejected() {
        let (engine, memory_id, actor_id) = seeded_engine().await;
        let result = engine.search(SearchRequest::new(actor_id, memory_id, "fox").alpha(1.5)).await;
        assert!(matches!(result, Err(SearchError::InvalidAlpha)));
    }

    #[tokio::test]
    async fn memory_with_no_context_snapshots_returns_empty_context_fields() {
        let store: Arc<dyn DurableStore> = Arc::new(InMemoryStore::new());
        let index: Arc<dyn Index> = Arc::new(mycelian_index::InMemoryIndex::new());
        let embedder: Arc<dyn Embedder> = Arc::new(DeterministicEmbedder::new(16));
        let actor_id = "alice".to_string();
        let vault = store.create_vault(actor_id.clone(), "notes".to_string(), None).await.unwrap();
        let memory = store
            .create_memory(vault.id, actor_id.clone(), "chat".to_string(), "conversation".to_string(), None)
            .await
            .unwrap();
        let entry = store
            .create_entry(memory.id, actor_id.clone(), "hello".into(), "hello".into(), None, None, None, None)
            .await
            .unwrap();
        let embedding = embedder.embed("hello").await.unwrap();
        index
            .upsert_entry(IndexedEntry {
                id: entry.id,
                memory_id: memory.id,
                text: "hello".to_string(),
                embedding,
                created_at: entry.created_at,
            })
            .await
            .unwrap();

        let engine = SearchEngine::new(store, index, embedder);
        let response = engine.search(SearchRequest::new(actor_id, memory.id, "hello")).await.unwrap();
        assert!(response.latest_context.is_none());
        assert!(response.best_context.is_none());
        assert!(response.context_timestamp.is_none());
    }
}
