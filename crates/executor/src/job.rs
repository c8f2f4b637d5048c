use async_trait::async_trait;

use crate::error::JobFailure;

/// One unit of work run by a shard worker. Jobs are tagged variants in
/// the write pipeline ({AddEntry, PutContext, DeleteEntry, DeleteContext,
/// Sentinel} "Polymorphism") but the executor only needs the
/// uniform `run` capability — no inheritance, just a trait object.
#[async_trait]
pub trait Job: Send + 'static {
    async fn run(&mut self) -> Result<(), JobFailure>;

    /// Human-readable label used in tracing spans (e.g. "add_entry").
    fn label(&self) -> &'static str {
        "job"
    }
}
