//! Tracks, per memory id, the id of the most recently indexed object —
//! the piece of state `AwaitConsistency`'s sentinel needs to know what to
//! poll for.

use std::collections::HashMap;

use mycelian_model::{ContextId, EntryId, MemoryId};
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LastWrite {
    Entry(EntryId),
    Context(ContextId),
}

#[derive(Default)]
pub struct ConsistencyTracker {
    state: RwLock<HashMap<MemoryId, LastWrite>>,
}

impl ConsistencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, memory_id: MemoryId, write: LastWrite) {
        self.state.write().await.insert(memory_id, write);
    }

    pub async fn last(&self, memory_id: MemoryId) -> Option<LastWrite> {
        self.state.read().await.get(&memory_id).copied()
    }
}
