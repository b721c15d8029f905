//! User-scoped memory storage
//!
//! `MemoryStore` owns the per-user indexes and turns the cache tier into a
//! memory store: quotas, sliding expiry, ranked search and write-through
//! persistence.

mod memory_store;
mod persistence;
mod sweeper;
mod user_index;

pub use memory_store::MemoryStore;
pub use persistence::{JsonDirPersistence, PersistenceHook};
pub use sweeper::{ExpirySweeper, SweepCommand};
pub use user_index::UserIndex;
