//! In-memory `DurableStore`: a `Vec` of rows plus `HashMap` indices for
//! O(1) lookup, guarded by a single `tokio::sync::RwLock` since this
//! store is shared across shard workers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mycelian_model::{
    ActorId, ContextBody, ContextId, ContextSnapshot, Entry, EntryId, Memory, MemoryId, Metadata,
    Tags, Vault, VaultId,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{DurableStore, EntryPage, StoreError};

#[derive(Default)]
struct State {
    vaults: HashMap<VaultId, Vault>,
    memories: HashMap<MemoryId, Memory>,
    memories_by_vault: HashMap<VaultId, Vec<MemoryId>>,
    entries: HashMap<EntryId, Entry>,
    entries_by_memory: HashMap<MemoryId, Vec<EntryId>>,
    contexts: HashMap<ContextId, ContextSnapshot>,
    contexts_by_memory: HashMap<MemoryId, Vec<ContextId>>,
}

/// Test/dev double for [`DurableStore`]. Not durable across process
/// restarts; intended for unit and integration tests that exercise the
/// pipeline without standing up `redb`.
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn create_vault(
        &self,
        actor_id: ActorId,
        title: String,
        description: Option<String>,
    ) -> Result<Vault, StoreError> {
        let mut state = self.state.write().await;
        if state
            .vaults
            .values()
            .any(|v| v.actor_id == actor_id && v.title == title)
        {
            return Err(StoreError::Conflict(format!(
                "vault titled {title:?} already exists for actor {actor_id:?}"
            )));
        }
        let vault = Vault {
            id: Uuid::new_v4(),
            actor_id,
            title,
            description,
            created_at: Utc::now(),
        };
        state.vaults.insert(vault.id, vault.clone());
        Ok(vault)
    }

    async fn get_vault(&self, vault_id: VaultId) -> Result<Vault, StoreError> {
        self.state
            .read()
            .await
            .vaults
            .get(&vault_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("vault {vault_id}")))
    }

    async fn delete_vault(&self, vault_id: VaultId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.vaults.contains_key(&vault_id) {
            return Err(StoreError::NotFound(format!("vault {vault_id}")));
        }
        if state
            .memories_by_vault
            .get(&vault_id)
            .is_some_and(|m| !m.is_empty())
        {
            return Err(StoreError::Conflict(format!(
                "vault {vault_id} still has memories"
            )));
        }
        state.vaults.remove(&vault_id);
        state.memories_by_vault.remove(&vault_id);
        Ok(())
    }

    async fn create_memory(
        &self,
        vault_id: VaultId,
        actor_id: ActorId,
        title: String,
        memory_type: String,
        description: Option<String>,
    ) -> Result<Memory, StoreError> {
        let mut state = self.state.write().await;
        if !state.vaults.contains_key(&vault_id) {
            return Err(StoreError::NotFound(format!("vault {vault_id}")));
        }
        let siblings = state.memories_by_vault.entry(vault_id).or_default();
        if siblings
            .iter()
            .filter_map(|id| state.memories.get(id))
            .any(|m| m.title == title)
        {
            return Err(StoreError::Conflict(format!(
                "memory titled {title:?} already exists in vault {vault_id}"
            )));
        }
        let memory = Memory {
            id: Uuid::new_v4(),
            vault_id,
            actor_id,
            title,
            memory_type,
            description,
            created_at: Utc::now(),
        };
        state
            .memories_by_vault
            .entry(vault_id)
            .or_default()
            .push(memory.id);
        state.memories.insert(memory.id, memory.clone());
        Ok(memory)
    }

    async fn get_memory(&self, memory_id: MemoryId) -> Result<Memory, StoreError> {
        self.state
            .read()
            .await
            .memories
            .get(&memory_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("memory {memory_id}")))
    }

    async fn delete_memory(&self, memory_id: MemoryId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let memory = state
            .memories
            .remove(&memory_id)
            .ok_or_else(|| StoreError::NotFound(format!("memory {memory_id}")))?;
        if let Some(siblings) = state.memories_by_vault.get_mut(&memory.vault_id) {
            siblings.retain(|id| *id != memory_id);
        }
        if let Some(entry_ids) = state.entries_by_memory.remove(&memory_id) {
            for id in entry_ids {
                state.entries.remove(&id);
            }
        }
        if let Some(context_ids) = state.contexts_by_memory.remove(&memory_id) {
            for id in context_ids {
                state.contexts.remove(&id);
            }
        }
        Ok(())
    }

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
    ) -> Result<Entry, StoreError> {
        let mut state = self.state.write().await;
        if !state.memories.contains_key(&memory_id) {
            return Err(StoreError::NotFound(format!("memory {memory_id}")));
        }
        if let Some(cid) = context_id {
            match state.contexts.get(&cid) {
                Some(ctx) if ctx.memory_id == memory_id => {}
                _ => {
                    return Err(StoreError::NotFound(format!(
                        "context {cid} in memory {memory_id}"
                    )))
                }
            }
        }
        let entry = Entry {
            id: Uuid::new_v4(),
            memory_id,
            actor_id,
            created_at: Utc::now(),
            raw_entry,
            summary,
            tags,
            metadata,
            expiration_time,
            context_id,
        };
        state
            .entries_by_memory
            .entry(memory_id)
            .or_default()
            .push(entry.id);
        state.entries.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn get_entry(&self, memory_id: MemoryId, entry_id: EntryId) -> Result<Entry, StoreError> {
        let state = self.state.read().await;
        state
            .entries
            .get(&entry_id)
            .filter(|e| e.memory_id == memory_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("entry {entry_id} in memory {memory_id}")))
    }

    async fn list_entries(
        &self,
        memory_id: MemoryId,
        limit: usize,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> Result<EntryPage, StoreError> {
        let state = self.state.read().await;
        let mut entries: Vec<Entry> = state
            .entries_by_memory
            .get(&memory_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.entries.get(id))
            .filter(|e| before.is_none_or(|b| e.created_at < b))
            .filter(|e| after.is_none_or(|a| e.created_at > a))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        entries.reverse();
        entries.truncate(limit);
        Ok(EntryPage { entries })
    }

    async fn update_entry_tags(
        &self,
        memory_id: MemoryId,
        entry_id: EntryId,
        tags: Tags,
    ) -> Result<Entry, StoreError> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .get_mut(&entry_id)
            .filter(|e| e.memory_id == memory_id)
            .ok_or_else(|| StoreError::NotFound(format!("entry {entry_id} in memory {memory_id}")))?;
        entry.tags = Some(tags);
        Ok(entry.clone())
    }

    async fn delete_entry(&self, memory_id: MemoryId, entry_id: EntryId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let exists = state
            .entries
            .get(&entry_id)
            .is_some_and(|e| e.memory_id == memory_id);
        if !exists {
            return Err(StoreError::NotFound(format!(
                "entry {entry_id} in memory {memory_id}"
            )));
        }
        state.entries.remove(&entry_id);
        if let Some(ids) = state.entries_by_memory.get_mut(&memory_id) {
            ids.retain(|id| *id != entry_id);
        }
        Ok(())
    }

    async fn create_context(
        &self,
        memory_id: MemoryId,
        actor_id: ActorId,
        body: ContextBody,
    ) -> Result<ContextSnapshot, StoreError> {
        let mut state = self.state.write().await;
        if !state.memories.contains_key(&memory_id) {
            return Err(StoreError::NotFound(format!("memory {memory_id}")));
        }
        let snapshot = ContextSnapshot::new(memory_id, actor_id, body);
        state
            .contexts_by_memory
            .entry(memory_id)
            .or_default()
            .push(snapshot.id);
        state.contexts.insert(snapshot.id, snapshot.clone());
        Ok(snapshot)
    }

    async fn get_latest_context(
        &self,
        memory_id: MemoryId,
    ) -> Result<Option<ContextSnapshot>, StoreError> {
        let state = self.state.read().await;
        let latest = state
            .contexts_by_memory
            .get(&memory_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.contexts.get(id))
            .max_by_key(|c| c.created_at)
            .cloned();
        Ok(latest)
    }

    async fn get_context(
        &self,
        memory_id: MemoryId,
        context_id: ContextId,
    ) -> Result<ContextSnapshot, StoreError> {
        let state = self.state.read().await;
        state
            .contexts
            .get(&context_id)
            .filter(|c| c.memory_id == memory_id)
            .cloned()
            .ok_or_else(|| {
                StoreError::NotFound(format!("context {context_id} in memory {memory_id}"))
            })
    }

    async fn delete_context(&self, memory_id: MemoryId, context_id: ContextId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let exists = state
            .contexts
            .get(&context_id)
            .is_some_and(|c| c.memory_id == memory_id);
        if !exists {
            return Err(StoreError::NotFound(format!(
                "context {context_id} in memory {memory_id}"
            )));
        }
        state.contexts.remove(&context_id);
        if let Some(ids) = state.contexts_by_memory.get_mut(&memory_id) {
            ids.retain(|id| *id != context_id);
        }
        Ok(())
    }
}
