//! Bounded key/value cache tier
//!
//! The cache tier is the only component that owns stored bytes. It provides:
//! - Per-record time-to-live with lazy and swept expiry
//! - Capacity bounded by record count and by total bytes
//! - LRU eviction by access sequence, expired records first
//! - Atomic hit/miss/eviction counters
//! - Eviction listeners notified outside the capacity lock

mod tier;

pub use tier::{CacheConfig, CacheStats, CacheTier, MAX_TTL};

/// Why a record left the cache without an explicit remove
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionCause {
    /// The record's time-to-live elapsed
    Expired,
    /// Room was needed for a newer record
    Capacity,
}

/// Receives a callback for each evicted record
///
/// Callbacks run after the cache lock is released, so a listener may call
/// back into the cache.
pub trait EvictionListener: Send + Sync {
    fn on_evict(&self, key: &str, cause: EvictionCause);
}
