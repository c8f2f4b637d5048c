//! `redb`-backed [`Index`]: redb tables keyed by id, a newline-joined
//! per-scope id list, an LRU cache in front of the hot path, covering
//! the Entry/Context dual-class schema.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use mycelian_model::{ContextId, EntryId, MemoryId};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::{rank, HitKind, Index, IndexError, IndexedContext, IndexedEntry, SearchHit};

const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("indexed_entries");
const ENTRIES_BY_MEMORY_TABLE: TableDefinition<&str, &str> = TableDefinition::new("indexed_entries_by_memory");
const CONTEXTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("indexed_contexts");
const CONTEXTS_BY_MEMORY_TABLE: TableDefinition<&str, &str> = TableDefinition::new("indexed_contexts_by_memory");

/// Entries/contexts held in the hot-path LRU cache.
const LRU_CAPACITY: usize = 256;

fn to_backend(e: impl std::error::Error + Send + Sync + 'static) -> IndexError {
    IndexError::Backend(anyhow::Error::new(e))
}

fn append_id(existing: &str, id: &str) -> String {
    if existing.is_empty() {
        id.to_string()
    } else {
        format!("{existing}\n{id}")
    }
}

fn remove_id(existing: &str, id: &str) -> String {
    existing.lines().filter(|line| *line != id).collect::<Vec<_>>().join("\n")
}

fn parse_ids(list: &str) -> Vec<String> {
    list.lines().filter(|s| !s.is_empty()).map(String::from).collect()
}

enum CacheSlot {
    Entry(IndexedEntry),
    Context(IndexedContext),
}

/// Hybrid BM25+vector index backed by a single `redb` file, safe to
/// share across shard workers (`redb::Database` serializes writers
/// internally and allows concurrent readers).
pub struct RedbIndex {
    db: Database,
    path: PathBuf,
    cache: Mutex<LruCache<String, CacheSlot>>,
}

impl RedbIndex {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IndexError::Backend(e.into()))?;
        }
        let db = Database::create(&path).map_err(to_backend)?;
        {
            let tx = db.begin_write().map_err(to_backend)?;
            tx.open_table(ENTRIES_TABLE).map_err(to_backend)?;
            tx.open_table(ENTRIES_BY_MEMORY_TABLE).map_err(to_backend)?;
            tx.open_table(CONTEXTS_TABLE).map_err(to_backend)?;
            tx.open_table(CONTEXTS_BY_MEMORY_TABLE).map_err(to_backend)?;
            tx.commit().map_err(to_backend)?;
        }
        Ok(Self {
            db,
            path,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(LRU_CAPACITY).unwrap())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn list_index(&self, table: TableDefinition<&str, &str>, parent_id: &str) -> Result<Vec<String>, IndexError> {
        let tx = self.db.begin_read().map_err(to_backend)?;
        let tbl = tx.open_table(table).map_err(to_backend)?;
        let list = tbl
            .get(parent_id)
            .map_err(to_backend)?
            .map(|v| v.value().to_string())
            .unwrap_or_default();
        Ok(parse_ids(&list))
    }

    fn load_entry(&self, id: &str) -> Result<Option<IndexedEntry>, IndexError> {
        if let Some(CacheSlot::Entry(e)) = self.cache.lock().unwrap().get(id) {
            return Ok(Some(e.clone()));
        }
        let tx = self.db.begin_read().map_err(to_backend)?;
        let tbl = tx.open_table(ENTRIES_TABLE).map_err(to_backend)?;
        match tbl.get(id).map_err(to_backend)? {
            None => Ok(None),
            Some(v) => {
                let entry: IndexedEntry = serde_json::from_slice(v.value()).map_err(|e| IndexError::Backend(e.into()))?;
                self.cache.lock().unwrap().put(id.to_string(), CacheSlot::Entry(entry.clone()));
                Ok(Some(entry))
            }
        }
    }

    fn load_context(&self, id: &str) -> Result<Option<IndexedContext>, IndexError> {
        if let Some(CacheSlot::Context(c)) = self.cache.lock().unwrap().get(id) {
            return Ok(Some(c.clone()));
        }
        let tx = self.db.begin_read().map_err(to_backend)?;
        let tbl = tx.open_table(CONTEXTS_TABLE).map_err(to_backend)?;
        match tbl.get(id).map_err(to_backend)? {
            None => Ok(None),
            Some(v) => {
                let ctx: IndexedContext = serde_json::from_slice(v.value()).map_err(|e| IndexError::Backend(e.into()))?;
                self.cache.lock().unwrap().put(id.to_string(), CacheSlot::Context(ctx.clone()));
                Ok(Some(ctx))
            }
        }
    }
}

#[async_trait]
impl Index for RedbIndex {
    async fn upsert_entry(&self, indexed: IndexedEntry) -> Result<(), IndexError> {
        let id_str = indexed.id.to_string();
        let memory_id_str = indexed.memory_id.to_string();
        let is_new = self
            .db
            .begin_read()
            .map_err(to_backend)?
            .open_table(ENTRIES_TABLE)
            .map_err(to_backend)?
            .get(id_str.as_str())
            .map_err(to_backend)?
            .is_none();

        let tx = self.db.begin_write().map_err(to_backend)?;
        {
            let mut tbl = tx.open_table(ENTRIES_TABLE).map_err(to_backend)?;
            let bytes = serde_json::to_vec(&indexed).map_err(|e| IndexError::Backend(e.into()))?;
            tbl.insert(id_str.as_str(), bytes.as_slice()).map_err(to_backend)?;
        }
        if is_new {
            let mut idx = tx.open_table(ENTRIES_BY_MEMORY_TABLE).map_err(to_backend)?;
            let existing = idx
                .get(memory_id_str.as_str())
                .map_err(to_backend)?
                .map(|v| v.value().to_string())
                .unwrap_or_default();
            let updated = append_id(&existing, &id_str);
            idx.insert(memory_id_str.as_str(), updated.as_str()).map_err(to_backend)?;
        }
        tx.commit().map_err(to_backend)?;
        self.cache.lock().unwrap().put(id_str, CacheSlot::Entry(indexed));
        Ok(())
    }

    async fn remove_entry(&self, memory_id: MemoryId, entry_id: EntryId) -> Result<(), IndexError> {
        let id_str = entry_id.to_string();
        let memory_id_str = memory_id.to_string();
        let tx = self.db.begin_write().map_err(to_backend)?;
        {
            let mut tbl = tx.open_table(ENTRIES_TABLE).map_err(to_backend)?;
            tbl.remove(id_str.as_str()).map_err(to_backend)?;
        }
        {
            let mut idx = tx.open_table(ENTRIES_BY_MEMORY_TABLE).map_err(to_backend)?;
            let existing = idx
                .get(memory_id_str.as_str())
                .map_err(to_backend)?
                .map(|v| v.value().to_string())
                .unwrap_or_default();
            let updated = remove_id(&existing, &id_str);
            idx.insert(memory_id_str.as_str(), updated.as_str()).map_err(to_backend)?;
        }
        tx.commit().map_err(to_backend)?;
        self.cache.lock().unwrap().pop(&id_str);
        Ok(())
    }

    async fn upsert_context(&self, indexed: IndexedContext) -> Result<(), IndexError> {
        let id_str = indexed.id.to_string();
        let memory_id_str = indexed.memory_id.to_string();
        let is_new = self
            .db
            .begin_read()
            .map_err(to_backend)?
            .open_table(CONTEXTS_TABLE)
            .map_err(to_backend)?
            .get(id_str.as_str())
            .map_err(to_backend)?
            .is_none();

        let tx = self.db.begin_write().map_err(to_backend)?;
        {
            let mut tbl = tx.open_table(CONTEXTS_TABLE).map_err(to_backend)?;
            let bytes = serde_json::to_vec(&indexed).map_err(|e| IndexError::Backend(e.into()))?;
            tbl.insert(id_str.as_str(), bytes.as_slice()).map_err(to_backend)?;
        }
        if is_new {
            let mut idx = tx.open_table(CONTEXTS_BY_MEMORY_TABLE).map_err(to_backend)?;
            let existing = idx
                .get(memory_id_str.as_str())
                .map_err(to_backend)?
                .map(|v| v.value().to_string())
                .unwrap_or_default();
            let updated = append_id(&existing, &id_str);
            idx.insert(memory_id_str.as_str(), updated.as_str()).map_err(to_backend)?;
        }
        tx.commit().map_err(to_backend)?;
        self.cache.lock().unwrap().put(id_str, CacheSlot::Context(indexed));
        Ok(())
    }

    async fn remove_context(&self, memory_id: MemoryId, context_id: ContextId) -> Result<(), IndexError> {
        let id_str = context_id.to_string();
        let memory_id_str = memory_id.to_string();
        let tx = self.db.begin_write().map_err(to_backend)?;
        {
            let mut tbl = tx.open_table(CONTEXTS_TABLE).map_err(to_backend)?;
            tbl.remove(id_str.as_str()).map_err(to_backend)?;
        }
        {
            let mut idx = tx.open_table(CONTEXTS_BY_MEMORY_TABLE).map_err(to_backend)?;
            let existing = idx
                .get(memory_id_str.as_str())
                .map_err(to_backend)?
                .map(|v| v.value().to_string())
                .unwrap_or_default();
            let updated = remove_id(&existing, &id_str);
            idx.insert(memory_id_str.as_str(), updated.as_str()).map_err(to_backend)?;
        }
        tx.commit().map_err(to_backend)?;
        self.cache.lock().unwrap().pop(&id_str);
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
        let ids = self.list_index(ENTRIES_BY_MEMORY_TABLE, &memory_id.to_string())?;
        let mut candidates = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(entry) = self.load_entry(id)? {
                candidates.push(entry);
            }
        }
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
        let ids = self.list_index(CONTEXTS_BY_MEMORY_TABLE, &memory_id.to_string())?;
        let mut candidates = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(ctx) = self.load_context(id)? {
                candidates.push(ctx);
            }
        }
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
        Ok(self.load_entry(&entry_id.to_string())?.is_some())
    }

    async fn context_exists(&self, _memory_id: MemoryId, context_id: ContextId) -> Result<bool, IndexError> {
        Ok(self.load_context(&context_id.to_string())?.is_some())
    }

    async fn len(&self) -> Result<usize, IndexError> {
        let tx = self.db.begin_read().map_err(to_backend)?;
        let tbl = tx.open_table(ENTRIES_TABLE).map_err(to_backend)?;
        Ok(tbl.iter().map_err(to_backend)?.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(memory_id: MemoryId, text: &str) -> IndexedEntry {
        IndexedEntry {
            id: Uuid::new_v4(),
            memory_id,
            text: text.to_string(),
            embedding: vec![1.0, 0.0],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_then_search_round_trips() -> Result<(), IndexError> {
        let dir = tempfile::tempdir().expect("create temp dir");
        let index = RedbIndex::open(dir.path().join("roundtrip.redb"))?;
        let memory_id = Uuid::new_v4();
        let e = entry(memory_id, "quarterly roadmap review");
        index.upsert_entry(e.clone()).await?;

        let hits = index.search_entries(memory_id, "roadmap", &[], 10, 0.5).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, e.id);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_id() -> Result<(), IndexError> {
        let dir = tempfile::tempdir().expect("create temp dir");
        let index = RedbIndex::open(dir.path().join("idempotent.redb"))?;
        let memory_id = Uuid::new_v4();
        let mut e = entry(memory_id, "hello world");
        index.upsert_entry(e.clone()).await?;
        e.text = "hello world updated".to_string();
        index.upsert_entry(e.clone()).await?;

        assert_eq!(index.len().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn remove_entry_drops_it_from_results() -> Result<(), IndexError> {
        let dir = tempfile::tempdir().expect("create temp dir");
        let index = RedbIndex::open(dir.path().join("remove.redb"))?;
        let memory_id = Uuid::new_v4();
        let e = entry(memory_id, "roadmap");
        index.upsert_entry(e.clone()).await?;
        index.remove_entry(memory_id, e.id).await?;
        assert_eq!(index.len().await?, 0);
        Ok(())
    }
}
