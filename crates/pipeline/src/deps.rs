//! `PipelineDeps` — the small dependency bundle injected into every job
//! closure "Cyclic references": the executor, cache, and
//! pipeline all reference each other, so rather than wiring that cycle
//! with `Arc<RefCell<..>>`-style back-references, each job holds an
//! `Arc<PipelineDeps>` clone of the handful of collaborators it needs.

use std::sync::Arc;

use mycelian_embedding::Embedder;
use mycelian_index::Index;
use mycelian_store::DurableStore;

use crate::cache::ContextCache;
use crate::tracker::ConsistencyTracker;

pub struct PipelineDeps {
    pub store: Arc<dyn DurableStore>,
    pub index: Arc<dyn Index>,
    pub embedder: Arc<dyn Embedder>,
    pub cache: Arc<ContextCache>,
    pub tracker: Arc<ConsistencyTracker>,
}
