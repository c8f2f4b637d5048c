use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ActorId, ContextId, EntryId, MemoryId, VaultId};

/// Arbitrary JSON object. Used both for context bodies (where every
/// top-level value must be a non-empty string, enforced by
/// [`crate::validation::validate_context_body`]) and for entry
/// tags/metadata (unconstrained).
pub type ContextBody = serde_json::Map<String, serde_json::Value>;
pub type Tags = serde_json::Map<String, serde_json::Value>;
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Tenant namespace. Owned by exactly one actor; deletable only when it
/// contains no memories (enforced by the store, not this type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    pub actor_id: ActorId,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Topic-scoped container for entries and context snapshots. Belongs to
/// exactly one vault; deletion cascades to entries, contexts, and any
/// index records (the store/index implementations are responsible for
/// that cascade, not this type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    pub vault_id: VaultId,
    pub actor_id: ActorId,
    pub title: String,
    pub memory_type: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Immutable append-only record. The server assigns `id` and `created_at`;
/// client-supplied timestamps are never honored. Once written, only `tags`
/// may be updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub memory_id: MemoryId,
    pub actor_id: ActorId,
    pub created_at: DateTime<Utc>,
    pub raw_entry: String,
    pub summary: String,
    pub tags: Option<Tags>,
    pub metadata: Option<Metadata>,
    pub expiration_time: Option<DateTime<Utc>>,
    /// Id of the context snapshot that was logically active on this memory
    /// at the moment this entry was enqueued. Empty when no context had
    /// been put yet.
    pub context_id: Option<ContextId>,
}

impl Entry {
    /// The text an embedder should see: summary when present (it always is,
    /// per the core API contract — `summary` is required on write), falling
    /// back to the raw entry so a partially-constructed record (e.g. during
    /// replay) still embeds to something.
    pub fn embedding_text(&self) -> String {
        if self.summary.is_empty() {
            self.raw_entry.clone()
        } else {
            format!("{}\n{}", self.summary, self.raw_entry)
        }
    }
}

/// One snapshot in the monotonic series of "world model" documents for a
/// memory. All top-level values in `body` must be non-empty strings
/// (enforced by [`crate::validation::validate_context_body`] before the
/// write pipeline ever sees this type constructed with a server-assigned
/// id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub id: ContextId,
    pub memory_id: MemoryId,
    pub actor_id: ActorId,
    pub created_at: DateTime<Utc>,
    pub body: ContextBody,
}

/// Convenience constructor used by store implementations: the id and
/// timestamp are server-assigned, so callers only ever build this at the
/// point of durable persistence.
impl ContextSnapshot {
    pub fn new(memory_id: MemoryId, actor_id: ActorId, body: ContextBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            memory_id,
            actor_id,
            created_at: Utc::now(),
            body,
        }
    }
}
