//! Context Cache: per-memory latest context snapshot, as
//! observed by this process's own writes, so `AddEntry` jobs on the same
//! shard can attach it without a round-trip to the durable store.
//!
//! Reads and writes happen only inside the shard worker that owns a
//! given memory id (or, for `get_latest`, from the submitter capturing
//! "the context active at enqueue time" — step 2), so the map
//! needs no per-key locking beyond whatever `HashMap` access itself
//! requires across the small number of shard workers.

use std::collections::HashMap;

use mycelian_model::{ContextBody, ContextId, MemoryId};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct CachedContext {
    pub context_id: ContextId,
    pub body: ContextBody,
}

/// Soft-state cache: eviction is permitted at any time (a miss just means
/// "attach no context to this entry", invariants), so this type
/// never needs an explicit `evict` — a restarted process simply starts
/// with an empty cache.
#[derive(Default)]
pub struct ContextCache {
    state: RwLock<HashMap<MemoryId, CachedContext>>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_latest(&self, memory_id: MemoryId) -> Option<CachedContext> {
        self.state.read().await.get(&memory_id).cloned()
    }

    pub async fn put_latest(&self, memory_id: MemoryId, context_id: ContextId, body: ContextBody) {
        self.state.write().await.insert(memory_id, CachedContext { context_id, body });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = ContextCache::new();
        assert!(cache.get_latest(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = ContextCache::new();
        let memory_id = Uuid::new_v4();
        let context_id = Uuid::new_v4();
        let mut body = ContextBody::new();
        body.insert("activeContext".to_string(), json!("ctx-1"));
        cache.put_latest(memory_id, context_id, body.clone()).await;

        let cached = cache.get_latest(memory_id).await.unwrap();
        assert_eq!(cached.context_id, context_id);
        assert_eq!(cached.body, body);
    }

    #[tokio::test]
    async fn put_latest_overwrites_previous_value() {
        let cache = ContextCache::new();
        let memory_id = Uuid::new_v4();
        cache.put_latest(memory_id, Uuid::new_v4(), ContextBody::new()).await;
        let second_id = Uuid::new_v4();
        cache.put_latest(memory_id, second_id, ContextBody::new()).await;
        assert_eq!(cache.get_latest(memory_id).await.unwrap().context_id, second_id);
    }
}
