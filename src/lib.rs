//! Mnemos - cache-backed semantic memory
//!
//! Short, user-scoped memories held in a bounded cache tier, retrieved by
//! meaning through a pluggable semantic scorer, and kept within per-user
//! quotas by usage-based eviction.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod ranking;
pub mod stats;
pub mod store;
pub mod types;

pub use api::MemoryApi;
pub use config::MnemosConfig;
pub use error::{CacheError, Result, StoreError};
pub use store::MemoryStore;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
