//! Write Pipeline, Context Cache, and Consistency Barrier — the
//! ordered-write front end built on top of `mycelian_executor`'s shard
//! executor, covering the full add/put/delete/await-consistency surface.

mod cache;
mod deps;
mod error;
mod jobs;
mod pipeline;
mod tracker;

pub use cache::{CachedContext, ContextCache};
pub use deps::PipelineDeps;
pub use error::PipelineError;
pub use pipeline::WritePipeline;
pub use tracker::{ConsistencyTracker, LastWrite};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use mycelian_embedding::DeterministicEmbedder;
    use mycelian_executor::{ExecutorConfig, ShardExecutor};
    use mycelian_model::MemoryId;
    use mycelian_store::DurableStore;

    async fn test_pipeline() -> (WritePipeline, MemoryId) {
        let store = Arc::new(mycelian_store::InMemoryStore::new());
        let vault = store
            .create_vault("alice".to_string(), "notes".to_string(), None)
            .await
            .unwrap();
        let memory = store
            .create_memory(vault.id, "alice".to_string(), "chat".to_string(), "conversation".to_string(), None)
            .await
            .unwrap();

        let deps = Arc::new(PipelineDeps {
            store,
            index: Arc::new(mycelian_index::InMemoryIndex::new()),
            embedder: Arc::new(DeterministicEmbedder::new(16)),
            cache: Arc::new(ContextCache::new()),
            tracker: Arc::new(ConsistencyTracker::new()),
        });
        let executor = ShardExecutor::new(ExecutorConfig::default());
        (WritePipeline::new(executor, deps), memory.id)
    }

    #[tokio::test]
    async fn await_consistency_on_untouched_memory_resolves_immediately() {
        let (pipeline, memory_id) = test_pipeline().await;
        pipeline
            .await_consistency(memory_id, Duration::from_millis(50))
            .await
            .expect("no prior write means the barrier has nothing to wait for");
    }

    #[tokio::test]
    async fn add_entry_then_await_consistency_makes_it_searchable() {
        let (pipeline, memory_id) = test_pipeline().await;
        let entry = pipeline
            .add_entry(
                memory_id,
                "alice".to_string(),
                "paid the invoice".to_string(),
                "invoice paid".to_string(),
                None,
                None,
                None,
            )
            .await
            .expect("add_entry should succeed");

        pipeline
            .await_consistency(memory_id, Duration::from_secs(1))
            .await
            .expect("barrier should observe the entry once indexing completes");

        let _ = entry;
    }

    #[tokio::test]
    async fn put_context_is_visible_to_the_next_add_entry_via_the_cache() {
        let (pipeline, memory_id) = test_pipeline().await;
        let mut body = mycelian_model::ContextBody::new();
        body.insert("activeContext".to_string(), serde_json::json!("discussing invoices"));
        let ctx = pipeline
            .put_context(memory_id, "alice".to_string(), body)
            .await
            .expect("put_context should succeed");

        let cached = pipeline
            .add_entry(
                memory_id,
                "bob".to_string(),
                "acked the invoice".to_string(),
                "invoice ack".to_string(),
                None,
                None,
                None,
            )
            .await
            .expect("add_entry should succeed");

        assert_eq!(cached.context_id, Some(ctx.id));
    }

    #[tokio::test]
    async fn delete_entry_then_await_consistency_removes_it_from_the_index() {
        let (pipeline, memory_id) = test_pipeline().await;
        let entry = pipeline
            .add_entry(
                memory_id,
                "alice".to_string(),
                "temporary note".to_string(),
                "temp".to_string(),
                None,
                None,
                None,
            )
            .await
            .unwrap();
        pipeline.await_consistency(memory_id, Duration::from_secs(1)).await.unwrap();

        pipeline.delete_entry(memory_id, entry.id).await.expect("delete_entry should succeed");
        pipeline.await_consistency(memory_id, Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn add_entry_to_a_missing_memory_surfaces_store_not_found_not_invariant_violation() {
        let (pipeline, _memory_id) = test_pipeline().await;
        let missing_memory = mycelian_model::MemoryId::new_v4();
        let result = pipeline
            .add_entry(
                missing_memory,
                "alice".to_string(),
                "raw".to_string(),
                "summary".to_string(),
                None,
                None,
                None,
            )
            .await;

        match result {
            Err(PipelineError::Store(mycelian_store::StoreError::NotFound(_))) => {}
            other => panic!("expected PipelineError::Store(StoreError::NotFound(_)), got {other:?}"),
        }
    }
}
