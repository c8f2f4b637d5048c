//! `redb`-backed [`DurableStore`]: a full four-entity relational schema
//! over redb's table primitives.
//!
//! Each row table stores `id (str) -> serde_json bytes`. Each `*_by_*`
//! table maps a parent id to a newline-separated list of child ids,
//! appended to on insert and rewritten wholesale on delete.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mycelian_model::{
    ActorId, ContextBody, ContextId, ContextSnapshot, Entry, EntryId, Memory, MemoryId, Metadata,
    Tags, Vault, VaultId,
};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::{DurableStore, EntryPage, StoreError};

const VAULTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("vaults");
const MEMORIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("memories");
const MEMORIES_BY_VAULT_TABLE: TableDefinition<&str, &str> = TableDefinition::new("memories_by_vault");
const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");
const ENTRIES_BY_MEMORY_TABLE: TableDefinition<&str, &str> = TableDefinition::new("entries_by_memory");
const CONTEXTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("contexts");
const CONTEXTS_BY_MEMORY_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("contexts_by_memory");

fn to_anyhow(e: impl std::error::Error + Send + Sync + 'static) -> StoreError {
    StoreError::Backend(anyhow::Error::new(e))
}

fn append_id(existing: &str, id: &str) -> String {
    if existing.is_empty() {
        id.to_string()
    } else {
        format!("{existing}\n{id}")
    }
}

fn remove_id(existing: &str, id: &str) -> String {
    existing
        .lines()
        .filter(|line| *line != id)
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_ids(list: &str) -> Vec<String> {
    list.lines().filter(|s| !s.is_empty()).map(String::from).collect()
}

/// Durable store backed by a single `redb` file. Safe to share across
/// shard workers: `redb::Database` serializes writers internally and
/// allows concurrent readers, so this type holds no additional lock.
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl RedbStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.into()))?;
        }
        let db = Database::create(&path).map_err(to_anyhow)?;
        {
            let tx = db.begin_write().map_err(to_anyhow)?;
            tx.open_table(VAULTS_TABLE).map_err(to_anyhow)?;
            tx.open_table(MEMORIES_TABLE).map_err(to_anyhow)?;
            tx.open_table(MEMORIES_BY_VAULT_TABLE).map_err(to_anyhow)?;
            tx.open_table(ENTRIES_TABLE).map_err(to_anyhow)?;
            tx.open_table(ENTRIES_BY_MEMORY_TABLE).map_err(to_anyhow)?;
            tx.open_table(CONTEXTS_TABLE).map_err(to_anyhow)?;
            tx.open_table(CONTEXTS_BY_MEMORY_TABLE).map_err(to_anyhow)?;
            tx.commit().map_err(to_anyhow)?;
        }
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_row<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<&str, &[u8]>,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let tx = self.db.begin_read().map_err(to_anyhow)?;
        let tbl = tx.open_table(table).map_err(to_anyhow)?;
        match tbl.get(id).map_err(to_anyhow)? {
            None => Ok(None),
            Some(v) => {
                let row = serde_json::from_slice(v.value()).map_err(|e| StoreError::Backend(e.into()))?;
                Ok(Some(row))
            }
        }
    }

    fn list_index(
        &self,
        table: TableDefinition<&str, &str>,
        parent_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        let tx = self.db.begin_read().map_err(to_anyhow)?;
        let tbl = tx.open_table(table).map_err(to_anyhow)?;
        let list = tbl
            .get(parent_id)
            .map_err(to_anyhow)?
            .map(|v| v.value().to_string())
            .unwrap_or_default();
        Ok(parse_ids(&list))
    }
}

#[async_trait]
impl DurableStore for RedbStore {
    async fn create_vault(
        &self,
        actor_id: ActorId,
        title: String,
        description: Option<String>,
    ) -> Result<Vault, StoreError> {
        let tx = self.db.begin_write().map_err(to_anyhow)?;
        {
            let tbl = tx.open_table(VAULTS_TABLE).map_err(to_anyhow)?;
            for row in tbl.iter().map_err(to_anyhow)? {
                let (_, v) = row.map_err(to_anyhow)?;
                let existing: Vault =
                    serde_json::from_slice(v.value()).map_err(|e| StoreError::Backend(e.into()))?;
                if existing.actor_id == actor_id && existing.title == title {
                    return Err(StoreError::Conflict(format!(
                        "vault titled {title:?} already exists for actor {actor_id:?}"
                    )));
                }
            }
        }
        let vault = Vault {
            id: Uuid::new_v4(),
            actor_id,
            title,
            description,
            created_at: Utc::now(),
        };
        {
            let mut tbl = tx.open_table(VAULTS_TABLE).map_err(to_anyhow)?;
            let bytes = serde_json::to_vec(&vault).map_err(|e| StoreError::Backend(e.into()))?;
            tbl.insert(vault.id.to_string().as_str(), bytes.as_slice())
                .map_err(to_anyhow)?;
        }
        tx.commit().map_err(to_anyhow)?;
        Ok(vault)
    }

    async fn get_vault(&self, vault_id: VaultId) -> Result<Vault, StoreError> {
        self.read_row(VAULTS_TABLE, &vault_id.to_string())?
            .ok_or_else(|| StoreError::NotFound(format!("vault {vault_id}")))
    }

    async fn delete_vault(&self, vault_id: VaultId) -> Result<(), StoreError> {
        let id_str = vault_id.to_string();
        if self.read_row::<Vault>(VAULTS_TABLE, &id_str)?.is_none() {
            return Err(StoreError::NotFound(format!("vault {vault_id}")));
        }
        if !self.list_index(MEMORIES_BY_VAULT_TABLE, &id_str)?.is_empty() {
            return Err(StoreError::Conflict(format!(
                "vault {vault_id} still has memories"
            )));
        }
        let tx = self.db.begin_write().map_err(to_anyhow)?;
        {
            let mut tbl = tx.open_table(VAULTS_TABLE).map_err(to_anyhow)?;
            tbl.remove(id_str.as_str()).map_err(to_anyhow)?;
        }
        tx.commit().map_err(to_anyhow)?;
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
        let vault_id_str = vault_id.to_string();
        if self.read_row::<Vault>(VAULTS_TABLE, &vault_id_str)?.is_none() {
            return Err(StoreError::NotFound(format!("vault {vault_id}")));
        }
        for sibling_id in self.list_index(MEMORIES_BY_VAULT_TABLE, &vault_id_str)? {
            if let Some(sibling) = self.read_row::<Memory>(MEMORIES_TABLE, &sibling_id)? {
                if sibling.title == title {
                    return Err(StoreError::Conflict(format!(
                        "memory titled {title:?} already exists in vault {vault_id}"
                    )));
                }
            }
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
        let tx = self.db.begin_write().map_err(to_anyhow)?;
        {
            let mut tbl = tx.open_table(MEMORIES_TABLE).map_err(to_anyhow)?;
            let bytes = serde_json::to_vec(&memory).map_err(|e| StoreError::Backend(e.into()))?;
            tbl.insert(memory.id.to_string().as_str(), bytes.as_slice())
                .map_err(to_anyhow)?;
        }
        {
            let mut idx = tx.open_table(MEMORIES_BY_VAULT_TABLE).map_err(to_anyhow)?;
            let existing = idx
                .get(vault_id_str.as_str())
                .map_err(to_anyhow)?
                .map(|v| v.value().to_string())
                .unwrap_or_default();
            let updated = append_id(&existing, &memory.id.to_string());
            idx.insert(vault_id_str.as_str(), updated.as_str())
                .map_err(to_anyhow)?;
        }
        tx.commit().map_err(to_anyhow)?;
        Ok(memory)
    }

    async fn get_memory(&self, memory_id: MemoryId) -> Result<Memory, StoreError> {
        self.read_row(MEMORIES_TABLE, &memory_id.to_string())?
            .ok_or_else(|| StoreError::NotFound(format!("memory {memory_id}")))
    }

    async fn delete_memory(&self, memory_id: MemoryId) -> Result<(), StoreError> {
        let id_str = memory_id.to_string();
        let memory: Memory = self
            .read_row(MEMORIES_TABLE, &id_str)?
            .ok_or_else(|| StoreError::NotFound(format!("memory {memory_id}")))?;
        let entry_ids = self.list_index(ENTRIES_BY_MEMORY_TABLE, &id_str)?;
        let context_ids = self.list_index(CONTEXTS_BY_MEMORY_TABLE, &id_str)?;
        let vault_id_str = memory.vault_id.to_string();

        let tx = self.db.begin_write().map_err(to_anyhow)?;
        {
            let mut tbl = tx.open_table(MEMORIES_TABLE).map_err(to_anyhow)?;
            tbl.remove(id_str.as_str()).map_err(to_anyhow)?;
        }
        {
            let mut idx = tx.open_table(MEMORIES_BY_VAULT_TABLE).map_err(to_anyhow)?;
            let existing = idx
                .get(vault_id_str.as_str())
                .map_err(to_anyhow)?
                .map(|v| v.value().to_string())
                .unwrap_or_default();
            let updated = remove_id(&existing, &id_str);
            idx.insert(vault_id_str.as_str(), updated.as_str())
                .map_err(to_anyhow)?;
        }
        {
            let mut entries_tbl = tx.open_table(ENTRIES_TABLE).map_err(to_anyhow)?;
            for eid in &entry_ids {
                entries_tbl.remove(eid.as_str()).map_err(to_anyhow)?;
            }
            let mut entries_idx = tx.open_table(ENTRIES_BY_MEMORY_TABLE).map_err(to_anyhow)?;
            entries_idx.remove(id_str.as_str()).map_err(to_anyhow)?;
        }
        {
            let mut contexts_tbl = tx.open_table(CONTEXTS_TABLE).map_err(to_anyhow)?;
            for cid in &context_ids {
                contexts_tbl.remove(cid.as_str()).map_err(to_anyhow)?;
            }
            let mut contexts_idx = tx.open_table(CONTEXTS_BY_MEMORY_TABLE).map_err(to_anyhow)?;
            contexts_idx.remove(id_str.as_str()).map_err(to_anyhow)?;
        }
        tx.commit().map_err(to_anyhow)?;
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
        let memory_id_str = memory_id.to_string();
        if self.read_row::<Memory>(MEMORIES_TABLE, &memory_id_str)?.is_none() {
            return Err(StoreError::NotFound(format!("memory {memory_id}")));
        }
        if let Some(cid) = context_id {
            match self.read_row::<ContextSnapshot>(CONTEXTS_TABLE, &cid.to_string())? {
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
        let tx = self.db.begin_write().map_err(to_anyhow)?;
        {
            let mut tbl = tx.open_table(ENTRIES_TABLE).map_err(to_anyhow)?;
            let bytes = serde_json::to_vec(&entry).map_err(|e| StoreError::Backend(e.into()))?;
            tbl.insert(entry.id.to_string().as_str(), bytes.as_slice())
                .map_err(to_anyhow)?;
        }
        {
            let mut idx = tx.open_table(ENTRIES_BY_MEMORY_TABLE).map_err(to_anyhow)?;
            let existing = idx
                .get(memory_id_str.as_str())
                .map_err(to_anyhow)?
                .map(|v| v.value().to_string())
                .unwrap_or_default();
            let updated = append_id(&existing, &entry.id.to_string());
            idx.insert(memory_id_str.as_str(), updated.as_str())
                .map_err(to_anyhow)?;
        }
        tx.commit().map_err(to_anyhow)?;
        Ok(entry)
    }

    async fn get_entry(&self, memory_id: MemoryId, entry_id: EntryId) -> Result<Entry, StoreError> {
        let entry: Entry = self
            .read_row(ENTRIES_TABLE, &entry_id.to_string())?
            .ok_or_else(|| StoreError::NotFound(format!("entry {entry_id} in memory {memory_id}")))?;
        if entry.memory_id != memory_id {
            return Err(StoreError::NotFound(format!(
                "entry {entry_id} in memory {memory_id}"
            )));
        }
        Ok(entry)
    }

    async fn list_entries(
        &self,
        memory_id: MemoryId,
        limit: usize,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> Result<EntryPage, StoreError> {
        let ids = self.list_index(ENTRIES_BY_MEMORY_TABLE, &memory_id.to_string())?;
        let mut entries = Vec::new();
        for id in ids {
            if let Some(entry) = self.read_row::<Entry>(ENTRIES_TABLE, &id)? {
                if before.is_none_or(|b| entry.created_at < b) && after.is_none_or(|a| entry.created_at > a) {
                    entries.push(entry);
                }
            }
        }
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
        let mut entry = self.get_entry(memory_id, entry_id).await?;
        entry.tags = Some(tags);
        let tx = self.db.begin_write().map_err(to_anyhow)?;
        {
            let mut tbl = tx.open_table(ENTRIES_TABLE).map_err(to_anyhow)?;
            let bytes = serde_json::to_vec(&entry).map_err(|e| StoreError::Backend(e.into()))?;
            tbl.insert(entry_id.to_string().as_str(), bytes.as_slice())
                .map_err(to_anyhow)?;
        }
        tx.commit().map_err(to_anyhow)?;
        Ok(entry)
    }

    async fn delete_entry(&self, memory_id: MemoryId, entry_id: EntryId) -> Result<(), StoreError> {
        self.get_entry(memory_id, entry_id).await?;
        let memory_id_str = memory_id.to_string();
        let entry_id_str = entry_id.to_string();
        let tx = self.db.begin_write().map_err(to_anyhow)?;
        {
            let mut tbl = tx.open_table(ENTRIES_TABLE).map_err(to_anyhow)?;
            tbl.remove(entry_id_str.as_str()).map_err(to_anyhow)?;
        }
        {
            let mut idx = tx.open_table(ENTRIES_BY_MEMORY_TABLE).map_err(to_anyhow)?;
            let existing = idx
                .get(memory_id_str.as_str())
                .map_err(to_anyhow)?
                .map(|v| v.value().to_string())
                .unwrap_or_default();
            let updated = remove_id(&existing, &entry_id_str);
            idx.insert(memory_id_str.as_str(), updated.as_str())
                .map_err(to_anyhow)?;
        }
        tx.commit().map_err(to_anyhow)?;
        Ok(())
    }

    async fn create_context(
        &self,
        memory_id: MemoryId,
        actor_id: ActorId,
        body: ContextBody,
    ) -> Result<ContextSnapshot, StoreError> {
        let memory_id_str = memory_id.to_string();
        if self.read_row::<Memory>(MEMORIES_TABLE, &memory_id_str)?.is_none() {
            return Err(StoreError::NotFound(format!("memory {memory_id}")));
        }
        let snapshot = ContextSnapshot::new(memory_id, actor_id, body);
        let tx = self.db.begin_write().map_err(to_anyhow)?;
        {
            let mut tbl = tx.open_table(CONTEXTS_TABLE).map_err(to_anyhow)?;
            let bytes = serde_json::to_vec(&snapshot).map_err(|e| StoreError::Backend(e.into()))?;
            tbl.insert(snapshot.id.to_string().as_str(), bytes.as_slice())
                .map_err(to_anyhow)?;
        }
        {
            let mut idx = tx.open_table(CONTEXTS_BY_MEMORY_TABLE).map_err(to_anyhow)?;
            let existing = idx
                .get(memory_id_str.as_str())
                .map_err(to_anyhow)?
                .map(|v| v.value().to_string())
                .unwrap_or_default();
            let updated = append_id(&existing, &snapshot.id.to_string());
            idx.insert(memory_id_str.as_str(), updated.as_str())
                .map_err(to_anyhow)?;
        }
        tx.commit().map_err(to_anyhow)?;
        Ok(snapshot)
    }

    async fn get_latest_context(
        &self,
        memory_id: MemoryId,
    ) -> Result<Option<ContextSnapshot>, StoreError> {
        let ids = self.list_index(CONTEXTS_BY_MEMORY_TABLE, &memory_id.to_string())?;
        let mut latest: Option<ContextSnapshot> = None;
        for id in ids {
            if let Some(ctx) = self.read_row::<ContextSnapshot>(CONTEXTS_TABLE, &id)? {
                if latest.as_ref().is_none_or(|l| ctx.created_at > l.created_at) {
                    latest = Some(ctx);
                }
            }
        }
        Ok(latest)
    }

    async fn get_context(
        &self,
        memory_id: MemoryId,
        context_id: ContextId,
    ) -> Result<ContextSnapshot, StoreError> {
        let ctx: ContextSnapshot = self
            .read_row(CONTEXTS_TABLE, &context_id.to_string())?
            .ok_or_else(|| {
                StoreError::NotFound(format!("context {context_id} in memory {memory_id}"))
            })?;
        if ctx.memory_id != memory_id {
            return Err(StoreError::NotFound(format!(
                "context {context_id} in memory {memory_id}"
            )));
        }
        Ok(ctx)
    }

    async fn delete_context(&self, memory_id: MemoryId, context_id: ContextId) -> Result<(), StoreError> {
        self.get_context(memory_id, context_id).await?;
        let memory_id_str = memory_id.to_string();
        let context_id_str = context_id.to_string();
        let tx = self.db.begin_write().map_err(to_anyhow)?;
        {
            let mut tbl = tx.open_table(CONTEXTS_TABLE).map_err(to_anyhow)?;
            tbl.remove(context_id_str.as_str()).map_err(to_anyhow)?;
        }
        {
            let mut idx = tx.open_table(CONTEXTS_BY_MEMORY_TABLE).map_err(to_anyhow)?;
            let existing = idx
                .get(memory_id_str.as_str())
                .map_err(to_anyhow)?
                .map(|v| v.value().to_string())
                .unwrap_or_default();
            let updated = remove_id(&existing, &context_id_str);
            idx.insert(memory_id_str.as_str(), updated.as_str())
                .map_err(to_anyhow)?;
        }
        tx.commit().map_err(to_anyhow)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn vault_memory_entry_round_trip() -> Result<(), StoreError> {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = RedbStore::open(dir.path().join("roundtrip.redb")).expect("open redb store");
        let vault = store
            .create_vault("alice".to_string(), "notes".to_string(), None)
            .await?;
        let memory = store
            .create_memory(vault.id, "alice".to_string(), "work".to_string(), "projector".to_string(), None)
            .await?;
        let entry = store
            .create_entry(
                memory.id,
                "alice".to_string(),
                "raw".to_string(),
                "summary".to_string(),
                None,
                None,
                None,
                None,
            )
            .await?;
        let fetched = store.get_entry(memory.id, entry.id).await?;
        assert_eq!(fetched.raw_entry, "raw");
        Ok(())
    }

    #[tokio::test]
    async fn context_round_trip_and_latest() -> Result<(), StoreError> {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = RedbStore::open(dir.path().join("latest-context.redb")).expect("open redb store");
        let vault = store
            .create_vault("alice".to_string(), "notes".to_string(), None)
            .await?;
        let memory = store
            .create_memory(vault.id, "alice".to_string(), "work".to_string(), "projector".to_string(), None)
            .await?;
        let mut body = ContextBody::new();
        body.insert("activeContext".to_string(), json!("first"));
        store.create_context(memory.id, "alice".to_string(), body).await?;

        let mut body2 = ContextBody::new();
        body2.insert("activeContext".to_string(), json!("second"));
        let second = store.create_context(memory.id, "alice".to_string(), body2).await?;

        let latest = store.get_latest_context(memory.id).await?.unwrap();
        assert_eq!(latest.id, second.id);
        Ok(())
    }

    #[tokio::test]
    async fn delete_memory_cascades_entries_and_contexts() -> Result<(), StoreError> {
        let dir = tempfile::tempdir().expect("create temp dir");
        let store = RedbStore::open(dir.path().join("cascade.redb")).expect("open redb store");
        let vault = store
            .create_vault("alice".to_string(), "notes".to_string(), None)
            .await?;
        let memory = store
            .create_memory(vault.id, "alice".to_string(), "work".to_string(), "projector".to_string(), None)
            .await?;
        let entry = store
            .create_entry(
                memory.id,
                "alice".to_string(),
                "raw".to_string(),
                "summary".to_string(),
                None,
                None,
                None,
                None,
            )
            .await?;
        store.delete_memory(memory.id).await?;
        assert!(matches!(
            store.get_entry(memory.id, entry.id).await,
            Err(StoreError::NotFound(_))
        ));
        Ok(())
    }
}
