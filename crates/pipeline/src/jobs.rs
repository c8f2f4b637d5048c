//! Typed job wrappers.
//!
//! Each job keeps its own progress as struct fields so a retried `run`
//! (driven by the shard worker's backoff loop) skips steps already
//! durable instead of repeating them — e.g. `AddEntryJob` never calls
//! `create_entry` twice even if the embed/index step that follows it
//! fails and is retried several times.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use mycelian_index::{IndexedContext, IndexedEntry};
use mycelian_model::{ActorId, ContextBody, ContextId, ContextSnapshot, Entry, EntryId, Metadata, MemoryId, Tags};
use mycelian_store::StoreError;
use mycelian_executor::{Job, JobFailure};
use tokio::sync::oneshot;

use crate::deps::PipelineDeps;
use crate::error::PipelineError;
use crate::tracker::LastWrite;

/// `StoreError::Backend` is the only variant worth retrying — the others
/// (`NotFound`, `Conflict`, `Validation`) reflect a request that will
/// never succeed no matter how many times it's replayed.
///
/// Returns both the caller-visible [`PipelineError`] (which keeps the
/// store's own error class — `NotFound`/`Conflict` stay 404/409-class
/// rather than flattening to an invariant violation) and the
/// [`JobFailure`] the shard worker uses to decide whether to retry.
fn store_failure(e: StoreError) -> (PipelineError, JobFailure) {
    let transient = matches!(e, StoreError::Backend(_));
    let message = e.to_string();
    let job_failure = if transient {
        JobFailure::transient(anyhow::anyhow!(message))
    } else {
        JobFailure::terminal(anyhow::anyhow!(message))
    };
    (PipelineError::Store(e), job_failure)
}

pub struct AddEntryJob {
    pub deps: Arc<PipelineDeps>,
    pub memory_id: MemoryId,
    pub actor_id: ActorId,
    pub raw_entry: String,
    pub summary: String,
    pub tags: Option<Tags>,
    pub metadata: Option<Metadata>,
    pub expiration_time: Option<DateTime<Utc>>,
    pub context_id: Option<ContextId>,
    pub entry: Option<Entry>,
    pub result_tx: Option<oneshot::Sender<Result<Entry, PipelineError>>>,
}

#[async_trait::async_trait]
impl Job for AddEntryJob {
    async fn run(&mut self) -> Result<(), JobFailure> {
        if self.entry.is_none() {
            let created = self
                .deps
                .store
                .create_entry(
                    self.memory_id,
                    self.actor_id.clone(),
                    self.raw_entry.clone(),
                    self.summary.clone(),
                    self.tags.clone(),
                    self.metadata.clone(),
                    self.expiration_time,
                    self.context_id,
                )
                .await;
            match created {
                Ok(entry) => {
                    self.entry = Some(entry.clone());
                    if let Some(tx) = self.result_tx.take() {
                        let _ = tx.send(Ok(entry));
                    }
                }
                Err(e) => {
                    let (pipeline_err, failure) = store_failure(e);
                    if let Some(tx) = self.result_tx.take() {
                        let _ = tx.send(Err(pipeline_err));
                    }
                    return Err(failure);
                }
            }
        }

        let entry = self.entry.clone().expect("entry set above");
        let text = entry.embedding_text();
        let embedding = self.deps.embedder.embed(&text).await.map_err(JobFailure::transient)?;
        let indexed = IndexedEntry {
            id: entry.id,
            memory_id: entry.memory_id,
            text,
            embedding,
            created_at: entry.created_at,
        };
        self.deps.index.upsert_entry(indexed).await.map_err(JobFailure::transient)?;
        self.deps.tracker.record(entry.memory_id, LastWrite::Entry(entry.id)).await;
        Ok(())
    }

    fn label(&self) -> &'static str {
        "add_entry"
    }
}

pub struct PutContextJob {
    pub deps: Arc<PipelineDeps>,
    pub memory_id: MemoryId,
    pub actor_id: ActorId,
    pub body: ContextBody,
    pub context: Option<ContextSnapshot>,
    pub result_tx: Option<oneshot::Sender<Result<ContextSnapshot, PipelineError>>>,
}

#[async_trait::async_trait]
impl Job for PutContextJob {
    async fn run(&mut self) -> Result<(), JobFailure> {
        if self.context.is_none() {
            let created = self
                .deps
                .store
                .create_context(self.memory_id, self.actor_id.clone(), self.body.clone())
                .await;
            match created {
                Ok(ctx) => {
                    self.deps.cache.put_latest(ctx.memory_id, ctx.id, ctx.body.clone()).await;
                    self.context = Some(ctx.clone());
                    if let Some(tx) = self.result_tx.take() {
                        let _ = tx.send(Ok(ctx));
                    }
                }
                Err(e) => {
                    let (pipeline_err, failure) = store_failure(e);
                    if let Some(tx) = self.result_tx.take() {
                        let _ = tx.send(Err(pipeline_err));
                    }
                    return Err(failure);
                }
            }
        }

        let ctx = self.context.clone().expect("context set above");
        let canonical = serde_json::to_string(&ctx.body).unwrap_or_default();
        let embedding = self
            .deps
            .embedder
            .embed(&canonical)
            .await
            .map_err(JobFailure::transient)?;
        let indexed = IndexedContext {
            id: ctx.id,
            memory_id: ctx.memory_id,
            text: canonical,
            embedding,
            created_at: ctx.created_at,
        };
        self.deps.index.upsert_context(indexed).await.map_err(JobFailure::transient)?;
        self.deps.tracker.record(ctx.memory_id, LastWrite::Context(ctx.id)).await;
        Ok(())
    }

    fn label(&self) -> &'static str {
        "put_context"
    }
}

pub struct DeleteEntryJob {
    pub deps: Arc<PipelineDeps>,
    pub memory_id: MemoryId,
    pub entry_id: EntryId,
    pub deleted: bool,
    pub result_tx: Option<oneshot::Sender<Result<(), PipelineError>>>,
}

#[async_trait::async_trait]
impl Job for DeleteEntryJob {
    async fn run(&mut self) -> Result<(), JobFailure> {
        if !self.deleted {
            if let Err(e) = self.deps.store.delete_entry(self.memory_id, self.entry_id).await {
                let (pipeline_err, failure) = store_failure(e);
                if let Some(tx) = self.result_tx.take() {
                    let _ = tx.send(Err(pipeline_err));
                }
                return Err(failure);
            }
            self.deleted = true;
            if let Some(tx) = self.result_tx.take() {
                let _ = tx.send(Ok(()));
            }
        }

        // Best-effort index cleanup: not allowed to unwind the
        // durable delete that already happened above.
        self.deps
            .index
            .remove_entry(self.memory_id, self.entry_id)
            .await
            .map_err(JobFailure::transient)?;
        Ok(())
    }

    fn label(&self) -> &'static str {
        "delete_entry"
    }
}

pub struct DeleteContextJob {
    pub deps: Arc<PipelineDeps>,
    pub memory_id: MemoryId,
    pub context_id: ContextId,
    pub deleted: bool,
    pub result_tx: Option<oneshot::Sender<Result<(), PipelineError>>>,
}

#[async_trait::async_trait]
impl Job for DeleteContextJob {
    async fn run(&mut self) -> Result<(), JobFailure> {
        if !self.deleted {
            if let Err(e) = self.deps.store.delete_context(self.memory_id, self.context_id).await {
                let (pipeline_err, failure) = store_failure(e);
                if let Some(tx) = self.result_tx.take() {
                    let _ = tx.send(Err(pipeline_err));
                }
                return Err(failure);
            }
            self.deleted = true;
            if let Some(tx) = self.result_tx.take() {
                let _ = tx.send(Ok(()));
            }
        }

        self.deps
            .index
            .remove_context(self.memory_id, self.context_id)
            .await
            .map_err(JobFailure::transient)?;
        Ok(())
    }

    fn label(&self) -> &'static str {
        "delete_context"
    }
}

/// The consistency barrier's probe. Enqueued strictly after
/// whatever writes `AwaitConsistency` is meant to wait for, by virtue of
/// FIFO ordering on the same shard; when it runs, it polls the index for
/// the last write this process recorded for the memory and only
/// completes once that write is observable (or its deadline passes).
///
/// The target is read from the tracker inside `run`, not captured by the
/// caller at submit time: FIFO only guarantees prior jobs on this shard
/// have recorded their write by the time this job *runs*, not by the time
/// it was *submitted* (the caller may race ahead of an in-flight prior
/// job's own completion). Reading here is what makes the barrier strict.
pub struct SentinelJob {
    pub deps: Arc<PipelineDeps>,
    pub memory_id: MemoryId,
    pub poll_interval: Duration,
    pub deadline: Instant,
}

#[async_trait::async_trait]
impl Job for SentinelJob {
    async fn run(&mut self) -> Result<(), JobFailure> {
        let Some(target) = self.deps.tracker.last(self.memory_id).await else {
            return Ok(());
        };

        loop {
            let found = match target {
                LastWrite::Entry(id) => self.deps.index.entry_exists(self.memory_id, id).await,
                LastWrite::Context(id) => self.deps.index.context_exists(self.memory_id, id).await,
            }
            .map_err(JobFailure::transient)?;

            if found {
                return Ok(());
            }

            let now = Instant::now();
            if now >= self.deadline {
                return Err(JobFailure::terminal(anyhow::anyhow!(
                    "await consistency deadline exceeded before index observed the write"
                )));
            }

            let remaining = self.deadline.saturating_duration_since(now);
            let sleep_for = self.poll_interval.min(remaining).max(Duration::from_millis(1));
            tokio::time::sleep(sleep_for).await;
        }
    }

    fn label(&self) -> &'static str {
        "sentinel"
    }
}
