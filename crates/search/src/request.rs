use mycelian_model::{ActorId, MemoryId, Tags};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_K: usize = 10;
pub const MIN_TOP_K: usize = 1;
pub const MAX_TOP_K: usize = 100;
pub const DEFAULT_ALPHA: f32 = 0.5;

/// `Search(actorId, memoryId, query, topK, alpha)`
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub actor_id: ActorId,
    pub memory_id: MemoryId,
    pub query: String,
    pub top_k: Option<usize>,
    pub alpha: Option<f32>,
}

impl SearchRequest {
    pub fn new(actor_id: ActorId, memory_id: MemoryId, query: impl Into<String>) -> Self {
        Self {
            actor_id,
            memory_id,
            query: query.into(),
            top_k: None,
            alpha: None,
        }
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = Some(alpha);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryHit {
    pub entry_id: uuid::Uuid,
    pub memory_id: uuid::Uuid,
    pub summary: String,
    pub raw_entry: String,
    pub score: f32,
    pub tags: Option<Tags>,
}

/// `{entries, count, latestContext, contextTimestamp, bestContext,
/// bestContextTimestamp, bestContextScore}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub entries: Vec<EntryHit>,
    pub count: usize,
    pub latest_context: Option<serde_json::Value>,
    pub context_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub best_context: Option<serde_json::Value>,
    pub best_context_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    pub best_context_score: Option<f32>,
}
