//! The public write pipeline: validates a write,
//! snapshots whatever the cache needs at enqueue time, submits a job to
//! the shard executor keyed by memory id, and for the mutating calls
//! resolves as soon as the durable store step inside that job completes
//! — not the full job, which keeps indexing in the background without
//! making the caller wait for it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mycelian_executor::{ExecutorConfig, ShardExecutor};
use mycelian_model::{ActorId, ContextBody, ContextId, ContextSnapshot, Entry, EntryId, Metadata, MemoryId, Tags};
use mycelian_model::validation;
use tokio::sync::oneshot;

use crate::deps::PipelineDeps;
use crate::error::PipelineError;
use crate::jobs::{AddEntryJob, DeleteContextJob, DeleteEntryJob, PutContextJob, SentinelJob};

fn shard_key(memory_id: MemoryId) -> [u8; 16] {
    *memory_id.as_bytes()
}

/// Ordered-write front end for a single process. One `WritePipeline`
/// fronts every memory it is asked to write to; the shard executor
/// underneath fans writes for distinct memories out across its workers
/// while keeping writes to the same memory strictly ordered.
pub struct WritePipeline {
    executor: Arc<ShardExecutor>,
    deps: Arc<PipelineDeps>,
}

impl WritePipeline {
    pub fn new(executor: Arc<ShardExecutor>, deps: Arc<PipelineDeps>) -> Self {
        Self { executor, deps }
    }

    /// Convenience constructor wiring in-memory test doubles: an
    /// in-memory store, an in-memory index, and the caller-supplied
    /// embedder.
    pub fn new_in_memory(embedder: Arc<dyn mycelian_embedding::Embedder>) -> Self {
        let deps = Arc::new(PipelineDeps {
            store: Arc::new(mycelian_store::InMemoryStore::new()),
            index: Arc::new(mycelian_index::InMemoryIndex::new()),
            embedder,
            cache: Arc::new(crate::cache::ContextCache::new()),
            tracker: Arc::new(crate::tracker::ConsistencyTracker::new()),
        });
        Self::new(ShardExecutor::new(ExecutorConfig::default()), deps)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add_entry(
        &self,
        memory_id: MemoryId,
        actor_id: ActorId,
        raw_entry: String,
        summary: String,
        tags: Option<Tags>,
        metadata: Option<Metadata>,
        expiration_time: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Entry, PipelineError> {
        validation::validate_raw_entry(&raw_entry)?;
        validation::validate_summary(&summary)?;

        // Snapshot the context active "at enqueue time"
        // from the submitter's own thread, before the job ever reaches the
        // shard — this is the one cache read allowed outside the worker.
        let context_id = self.deps.cache.get_latest(memory_id).await.map(|c| c.context_id);

        let (result_tx, result_rx) = oneshot::channel();
        let job = AddEntryJob {
            deps: self.deps.clone(),
            memory_id,
            actor_id,
            raw_entry,
            summary,
            tags,
            metadata,
            expiration_time,
            context_id,
            entry: None,
            result_tx: Some(result_tx),
        };

        self.executor.submit(&shard_key(memory_id), Box::new(job), None).await?;

        result_rx
            .await
            .map_err(|_| PipelineError::InvariantViolation("add_entry result channel dropped before durable write completed".into()))?
    }

    pub async fn put_context(
        &self,
        memory_id: MemoryId,
        actor_id: ActorId,
        body: ContextBody,
    ) -> Result<ContextSnapshot, PipelineError> {
        validation::validate_context_body(&body)?;

        let (result_tx, result_rx) = oneshot::channel();
        let job = PutContextJob {
            deps: self.deps.clone(),
            memory_id,
            actor_id,
            body,
            context: None,
            result_tx: Some(result_tx),
        };

        self.executor.submit(&shard_key(memory_id), Box::new(job), None).await?;

        result_rx
            .await
            .map_err(|_| PipelineError::InvariantViolation("put_context result channel dropped before durable write completed".into()))?
    }

    pub async fn delete_entry(&self, memory_id: MemoryId, entry_id: EntryId) -> Result<(), PipelineError> {
        let (result_tx, result_rx) = oneshot::channel();
        let job = DeleteEntryJob {
            deps: self.deps.clone(),
            memory_id,
            entry_id,
            deleted: false,
            result_tx: Some(result_tx),
        };

        self.executor.submit(&shard_key(memory_id), Box::new(job), None).await?;

        result_rx
            .await
            .map_err(|_| PipelineError::InvariantViolation("delete_entry result channel dropped before durable delete completed".into()))?
    }

    pub async fn delete_context(&self, memory_id: MemoryId, context_id: ContextId) -> Result<(), PipelineError> {
        let (result_tx, result_rx) = oneshot::channel();
        let job = DeleteContextJob {
            deps: self.deps.clone(),
            memory_id,
            context_id,
            deleted: false,
            result_tx: Some(result_tx),
        };

        self.executor.submit(&shard_key(memory_id), Box::new(job), None).await?;

        result_rx
            .await
            .map_err(|_| PipelineError::InvariantViolation("delete_context result channel dropped before durable delete completed".into()))?
    }

    /// Consistency barrier: blocks until every write this
    /// process has submitted for `memory_id` is observable through the
    /// index, or `deadline` elapses. Implemented by enqueuing a sentinel
    /// job on the same shard — FIFO guarantees it runs after every write
    /// already submitted — that polls the index for the last write id
    /// this process recorded.
    pub async fn await_consistency(&self, memory_id: MemoryId, deadline: Duration) -> Result<(), PipelineError> {
        let job = SentinelJob {
            deps: self.deps.clone(),
            memory_id,
            poll_interval: Duration::from_millis(25),
            deadline: Instant::now() + deadline,
        };

        let ack = self.executor.submit(&shard_key(memory_id), Box::new(job), None).await?;

        match tokio::time::timeout(deadline, ack.wait()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PipelineError::JobFailed(e)),
            Err(_) => Err(PipelineError::ConsistencyTimeout(deadline)),
        }
    }
}
