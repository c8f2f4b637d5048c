//! Data model for Mycelian Memory: vaults, memories, entries, and context
//! snapshots, plus the validation rules every write must pass before it is
//! handed to the write pipeline.
//!
//! This crate has no knowledge of storage, indexing, or concurrency — it is
//! the set of plain types and pure validation functions every other crate in
//! the workspace builds on.

mod entities;
pub mod validation;

pub use entities::{ContextBody, ContextSnapshot, Entry, Memory, Metadata, Tags, Vault};
pub use validation::ValidationError;

/// A vault/memory/entry/context id. Opaque beyond its uuid-ness.
pub type VaultId = uuid::Uuid;
pub type MemoryId = uuid::Uuid;
pub type EntryId = uuid::Uuid;
pub type ContextId = uuid::Uuid;

/// The authenticated principal that owns vaults. Kept as a plain string
/// matching `^[a-z0-9_]{1,20}$` rather than a newtype, consistent with
/// the other opaque ids in this module.
pub type ActorId = String;
