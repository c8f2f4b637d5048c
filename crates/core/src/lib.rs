//! `MycelianCore` — the top-level facade wiring every component into
//! one handle: a thin `mod`/`pub use` aggregation exposing one entry
//! point per collaborator rather than leaking the sub-crate wiring to
//! callers.
//!
//! This crate owns no logic of its own beyond validation at the vault/
//! memory boundary (which sits above the write pipeline's own entry/
//! context validation) and construction convenience — every interesting
//! guarantee (FIFO ordering, read-your-writes, hybrid ranking) lives in
//! `mycelian_executor`, `mycelian_pipeline`, and `mycelian_search`.

mod config;
mod error;

pub use config::CoreConfig;
pub use error::CoreError;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mycelian_embedding::Embedder;
use mycelian_executor::ShardExecutor;
use mycelian_index::Index;
use mycelian_model::{
    validation, ActorId, ContextBody, ContextId, ContextSnapshot, Entry, EntryId, Memory, MemoryId,
    Metadata, Tags, Vault, VaultId,
};
use mycelian_pipeline::{ContextCache, ConsistencyTracker, PipelineDeps, WritePipeline};
use mycelian_search::{SearchRequest, SearchResponse};
use mycelian_store::{DurableStore, EntryPage};

/// Default page size for `list_entries` when the caller doesn't specify
/// one.
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// One process's handle onto Mycelian Memory: the durable store, the
/// hybrid index, the embedding provider, the shard executor and write
/// pipeline built on top of them, and the stateless search engine.
pub struct MycelianCore {
    store: Arc<dyn DurableStore>,
    pipeline: WritePipeline,
    search: mycelian_search::SearchEngine,
    executor: Arc<ShardExecutor>,
}

impl MycelianCore {
    /// Wire arbitrary implementations of the three external collaborators
    /// into a ready-to-use core.
    pub fn new(
        store: Arc<dyn DurableStore>,
        index: Arc<dyn Index>,
        embedder: Arc<dyn Embedder>,
        config: CoreConfig,
    ) -> Self {
        let executor = ShardExecutor::new(config.executor);
        let deps = Arc::new(PipelineDeps {
            store: store.clone(),
            index: index.clone(),
            embedder: embedder.clone(),
            cache: Arc::new(ContextCache::new()),
            tracker: Arc::new(ConsistencyTracker::new()),
        });
        let pipeline = WritePipeline::new(executor.clone(), deps);
        let search = mycelian_search::SearchEngine::new(store.clone(), index, embedder);
        Self {
            store,
            pipeline,
            search,
            executor,
        }
    }

    /// Convenience constructor for tests and local development: an
    /// in-memory store, an in-memory index, and a deterministic
    /// hash-based embedder that needs no network.
    pub fn new_in_memory() -> Self {
        Self::new(
            Arc::new(mycelian_store::InMemoryStore::new()),
            Arc::new(mycelian_index::InMemoryIndex::new()),
            Arc::new(mycelian_embedding::DeterministicEmbedder::new(16)),
            CoreConfig::default(),
        )
    }

    // ---- Vault -----------------------------------------------------

    pub async fn create_vault(
        &self,
        actor_id: ActorId,
        title: String,
        description: Option<String>,
    ) -> Result<Vault, CoreError> {
        validation::validate_user_id(&actor_id)?;
        validation::validate_title(&title)?;
        validation::validate_description(description.as_deref())?;
        Ok(self.store.create_vault(actor_id, title, description).await?)
    }

    pub async fn get_vault(&self, vault_id: VaultId) -> Result<Vault, CoreError> {
        Ok(self.store.get_vault(vault_id).await?)
    }

    /// Deletable only when it contains no memories; the store
    /// enforces this and surfaces a `Conflict` otherwise.
    pub async fn delete_vault(&self, vault_id: VaultId) -> Result<(), CoreError> {
        Ok(self.store.delete_vault(vault_id).await?)
    }

    // ---- Memory ------------------------------------------------------

    pub async fn create_memory(
        &self,
        vault_id: VaultId,
        actor_id: ActorId,
        title: String,
        memory_type: String,
        description: Option<String>,
    ) -> Result<Memory, CoreError> {
        validation::validate_title(&title)?;
        validation::validate_description(description.as_deref())?;
        Ok(self
            .store
            .create_memory(vault_id, actor_id, title, memory_type, description)
            .await?)
    }

    pub async fn get_memory(&self, memory_id: MemoryId) -> Result<Memory, CoreError> {
        Ok(self.store.get_memory(memory_id).await?)
    }

    /// Cascades to entries, contexts, and index records.
    pub async fn delete_memory(&self, memory_id: MemoryId) -> Result<(), CoreError> {
        Ok(self.store.delete_memory(memory_id).await?)
    }

    // ---- Entries (write pipeline) --------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn add_entry(
        &self,
        memory_id: MemoryId,
        actor_id: ActorId,
        raw_entry: String,
        summary: String,
        tags: Option<Tags>,
        metadata: Option<Metadata>,
        expiration_time: Option<DateTime<Utc>>,
    ) -> Result<Entry, CoreError> {
        Ok(self
            .pipeline
            .add_entry(memory_id, actor_id, raw_entry, summary, tags, metadata, expiration_time)
            .await?)
    }

    pub async fn get_entry(&self, memory_id: MemoryId, entry_id: EntryId) -> Result<Entry, CoreError> {
        Ok(self.store.get_entry(memory_id, entry_id).await?)
    }

    pub async fn list_entries(
        &self,
        memory_id: MemoryId,
        limit: Option<usize>,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> Result<EntryPage, CoreError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
        Ok(self.store.list_entries(memory_id, limit, before, after).await?)
    }

    /// Once written, only the tags map may be updated in place; this
    /// bypasses the shard executor because it doesn't touch the index
    /// and has no ordering dependency on other writes to the memory.
    pub async fn update_entry_tags(
        &self,
        memory_id: MemoryId,
        entry_id: EntryId,
        tags: Tags,
    ) -> Result<Entry, CoreError> {
        Ok(self.store.update_entry_tags(memory_id, entry_id, tags).await?)
    }

    /// Hard delete, not a tombstone; best-effort index cleanup
    /// happens inside the pipeline's job.
    pub async fn delete_entry(&self, memory_id: MemoryId, entry_id: EntryId) -> Result<(), CoreError> {
        Ok(self.pipeline.delete_entry(memory_id, entry_id).await?)
    }

    // ---- Context snapshots (write pipeline) ----------------------------

    pub async fn put_context(
        &self,
        memory_id: MemoryId,
        actor_id: ActorId,
        body: ContextBody,
    ) -> Result<ContextSnapshot, CoreError> {
        Ok(self.pipeline.put_context(memory_id, actor_id, body).await?)
    }

    /// Greatest-`created_at` context snapshot for the memory, or `None` if the memory has none yet.
    pub async fn get_latest_context(&self, memory_id: MemoryId) -> Result<Option<ContextSnapshot>, CoreError> {
        Ok(self.store.get_latest_context(memory_id).await?)
    }

    pub async fn get_context(&self, memory_id: MemoryId, context_id: ContextId) -> Result<ContextSnapshot, CoreError> {
        Ok(self.store.get_context(memory_id, context_id).await?)
    }

    /// Deletion of an individual snapshot does not rewrite earlier
    /// snapshots' references.
    pub async fn delete_context(&self, memory_id: MemoryId, context_id: ContextId) -> Result<(), CoreError> {
        Ok(self.pipeline.delete_context(memory_id, context_id).await?)
    }

    // ---- Consistency barrier -------------------------------------------

    pub async fn await_consistency(&self, memory_id: MemoryId, deadline: Duration) -> Result<(), CoreError> {
        Ok(self.pipeline.await_consistency(memory_id, deadline).await?)
    }

    // ---- Search ----------------------------------------------------------

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, CoreError> {
        Ok(self.search.search(request).await?)
    }

    // ---- Lifecycle -----------------------------------------------------

    /// `Close(drain)` for the underlying shard executor: after
    /// this call, new writes through this handle fail with
    /// `ExecutorError::Closed`. When `drain`, waits for every in-flight and
    /// queued job to finish first.
    pub async fn close(&self, drain: bool) {
        self.executor.close(drain).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn end_to_end_s1_ordered_entries_with_evolving_context() {
        let core = MycelianCore::new_in_memory();
        let vault = core
            .create_vault("alice".to_string(), "notes".to_string(), None)
            .await
            .unwrap();
        let memory = core
            .create_memory(vault.id, "alice".to_string(), "chat".to_string(), "CONVERSATION".to_string(), None)
            .await
            .unwrap();

        let mut ctx1_body = ContextBody::new();
        ctx1_body.insert("activeContext".to_string(), serde_json::json!("ctx-1"));
        let ctx1 = core.put_context(memory.id, "alice".to_string(), ctx1_body).await.unwrap();
        let entry1 = core
            .add_entry(memory.id, "alice".to_string(), "entry-1".into(), "entry-1".into(), None, None, None)
            .await
            .unwrap();

        let mut ctx2_body = ContextBody::new();
        ctx2_body.insert("activeContext".to_string(), serde_json::json!("ctx-2"));
        let ctx2 = core.put_context(memory.id, "alice".to_string(), ctx2_body).await.unwrap();
        let entry2 = core
            .add_entry(memory.id, "alice".to_string(), "entry-2".into(), "entry-2".into(), None, None, None)
            .await
            .unwrap();

        let mut ctx3_body = ContextBody::new();
        ctx3_body.insert("activeContext".to_string(), serde_json::json!("ctx-3"));
        let ctx3 = core.put_context(memory.id, "alice".to_string(), ctx3_body).await.unwrap();
        let entry3 = core
            .add_entry(memory.id, "alice".to_string(), "entry-3".into(), "entry-3".into(), None, None, None)
            .await
            .unwrap();

        core.await_consistency(memory.id, Duration::from_secs(2)).await.unwrap();

        assert_eq!(entry1.context_id, Some(ctx1.id));
        assert_eq!(entry2.context_id, Some(ctx2.id));
        assert_eq!(entry3.context_id, Some(ctx3.id));

        let latest = core.get_latest_context(memory.id).await.unwrap().unwrap();
        assert_eq!(latest.id, ctx3.id);
    }

    #[tokio::test]
    async fn end_to_end_s3_delete_propagation() {
        let core = MycelianCore::new_in_memory();
        let vault = core.create_vault("alice".to_string(), "notes".to_string(), None).await.unwrap();
        let memory = core
            .create_memory(vault.id, "alice".to_string(), "chat".to_string(), "CONVERSATION".to_string(), None)
            .await
            .unwrap();

        let token = "unique-token-xyz";
        let entry = core
            .add_entry(memory.id, "alice".to_string(), token.into(), token.into(), None, None, None)
            .await
            .unwrap();
        core.await_consistency(memory.id, Duration::from_secs(2)).await.unwrap();

        let before = core
            .search(SearchRequest::new("alice".to_string(), memory.id, token))
            .await
            .unwrap();
        assert!(before.count >= 1);

        core.delete_entry(memory.id, entry.id).await.unwrap();
        core.await_consistency(memory.id, Duration::from_secs(2)).await.unwrap();

        let after = core
            .search(SearchRequest::new("alice".to_string(), memory.id, token))
            .await
            .unwrap();
        assert_eq!(after.count, 0);
    }

    #[tokio::test]
    async fn vault_title_validation_rejects_bad_characters() {
        let core = MycelianCore::new_in_memory();
        let result = core.create_vault("alice".to_string(), "bad title!".to_string(), None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn end_to_end_s2_cross_agent_visibility() {
        let core = MycelianCore::new_in_memory();
        let vault = core.create_vault("alice".to_string(), "notes".to_string(), None).await.unwrap();
        let memory = core
            .create_memory(vault.id, "alice".to_string(), "chat".to_string(), "CONVERSATION".to_string(), None)
            .await
            .unwrap();

        // Agent A writes a context and an entry, then awaits consistency.
        let mut body = ContextBody::new();
        body.insert("activeContext".to_string(), serde_json::json!("Agent A context"));
        core.put_context(memory.id, "agent-a".to_string(), body).await.unwrap();
        core.add_entry(memory.id, "agent-a".to_string(), "A entry".into(), "A entry".into(), None, None, None)
            .await
            .unwrap();
        core.await_consistency(memory.id, Duration::from_secs(2)).await.unwrap();

        // Agent B observes the latest context A left behind, then adds its own entry.
        let seen = core.get_latest_context(memory.id).await.unwrap().unwrap();
        assert_eq!(seen.body["activeContext"], serde_json::json!("Agent A context"));

        core.add_entry(memory.id, "agent-b".to_string(), "B entry".into(), "B entry".into(), None, None, None)
            .await
            .unwrap();
        core.await_consistency(memory.id, Duration::from_secs(2)).await.unwrap();

        let page = core.list_entries(memory.id, Some(10), None, None).await.unwrap();
        assert_eq!(page.entries.len(), 2);
    }

    #[tokio::test]
    async fn close_drains_in_flight_work_before_returning() {
        let core = MycelianCore::new_in_memory();
        let vault = core.create_vault("alice".to_string(), "notes".to_string(), None).await.unwrap();
        let memory = core
            .create_memory(vault.id, "alice".to_string(), "chat".to_string(), "CONVERSATION".to_string(), None)
            .await
            .unwrap();
        core.add_entry(memory.id, "alice".to_string(), "hi".into(), "hi".into(), None, None, None)
            .await
            .unwrap();
        core.close(true).await;
    }
}
