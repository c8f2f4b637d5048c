//! `DurableStore` — the relational collaborator the write pipeline depends
//! on. This crate defines the trait and two implementations: an
//! in-memory double for tests ([`InMemoryStore`]) and a `redb`-backed
//! durable store ([`RedbStore`]) for real deployments, covering a full
//! relational schema (vaults, memories, entries, context snapshots) with
//! the invariant that an entry's `contextId`, when set, must reference a
//! context row that exists in the same memory.

mod error;
mod in_memory;
mod redb_store;

pub use error::StoreError;
pub use in_memory::InMemoryStore;
pub use redb_store::RedbStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mycelian_model::{ActorId, ContextBody, ContextId, ContextSnapshot, Entry, EntryId, Memory, MemoryId, Metadata, Tags, Vault, VaultId};

/// Page of entries returned by `list_entries`, plus whether more exist
/// beyond this page (used only internally for now — the HTTP pagination
/// envelope of is outside this crate's scope).
#[derive(Debug, Clone, Default)]
pub struct EntryPage {
    pub entries: Vec<Entry>,
}

/// The durable relational store. All methods are async so a real backend
/// (redb, or a SQL driver behind the same trait) can suspend on I/O
/// without blocking the shard worker that called it.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn create_vault(
        &self,
        actor_id: ActorId,
        title: String,
        description: Option<String>,
    ) -> Result<Vault, StoreError>;

    async fn get_vault(&self, vault_id: VaultId) -> Result<Vault, StoreError>;

    /// Deletable only when it contains no memories.
    async fn delete_vault(&self, vault_id: VaultId) -> Result<(), StoreError>;

    async fn create_memory(
        &self,
        vault_id: VaultId,
        actor_id: ActorId,
        title: String,
        memory_type: String,
        description: Option<String>,
    ) -> Result<Memory, StoreError>;

    async fn get_memory(&self, memory_id: MemoryId) -> Result<Memory, StoreError>;

    /// Cascades to entries, contexts, and (by the caller issuing matching
    /// index deletes) any index records.
    async fn delete_memory(&self, memory_id: MemoryId) -> Result<(), StoreError>;

    /// Assigns `id` and `created_at`; client-supplied timestamps are never
    /// honored. If `context_id` is `Some`, the store MUST verify a context
    /// with that id exists in the same memory before accepting the write.
    #[allow(clippy::too_many_arguments)]
    async fn create_entry(
        &self,
        memory_id: MemoryId,
        actor_id: ActorId,
        raw_entry: String,
        summary: String,
        tags: Option<Tags>,
        metadata: Option<Metadata>,
        expiration_time: Option<DateTime<Utc>>,
        context_id: Option<ContextId>,
    ) -> Result<Entry, StoreError>;

    async fn get_entry(&self, memory_id: MemoryId, entry_id: EntryId) -> Result<Entry, StoreError>;

    async fn list_entries(
        &self,
        memory_id: MemoryId,
        limit: usize,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> Result<EntryPage, StoreError>;

    /// Once written, only the tags map may be updated.
    async fn update_entry_tags(
        &self,
        memory_id: MemoryId,
        entry_id: EntryId,
        tags: Tags,
    ) -> Result<Entry, StoreError>;

    /// Hard delete, not a tombstone.
    async fn delete_entry(&self, memory_id: MemoryId, entry_id: EntryId) -> Result<(), StoreError>;

    async fn create_context(
        &self,
        memory_id: MemoryId,
        actor_id: ActorId,
        body: ContextBody,
    ) -> Result<ContextSnapshot, StoreError>;

    /// The context with the greatest `created_at` for this memory.
    async fn get_latest_context(
        &self,
        memory_id: MemoryId,
    ) -> Result<Option<ContextSnapshot>, StoreError>;

    async fn get_context(
        &self,
        memory_id: MemoryId,
        context_id: ContextId,
    ) -> Result<ContextSnapshot, StoreError>;

    /// Deletion of an individual snapshot does not rewrite earlier
    /// snapshots' references.
    async fn delete_context(&self, memory_id: MemoryId, context_id: ContextId) -> Result<(), StoreError>;
}
