//! Thread-safe TTL + LRU cache with entry and byte capacity
//!
//! Reads share a read lock and record recency through an atomic sequence
//! stamped on the record. The LRU index is ordered by the sequence a record
//! had when it was last indexed; eviction re-files records whose stamp moved
//! since, so a read never needs the write lock.

use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{EvictionCause, EvictionListener};
use crate::error::CacheError;

/// Longest lifetime a record can get; longer TTLs are capped to it
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now)
}

/// Capacity limits for the cache tier
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of records
    pub max_entries: usize,
    /// Maximum total bytes (keys + values)
    pub max_bytes: usize,
    /// Largest single record accepted by `put`
    pub max_record_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            max_bytes: 256 * 1024 * 1024,
            max_record_bytes: 64 * 1024,
        }
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub eviction_count: u64,
    pub expired_count: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}

struct CacheRecord {
    value: Arc<[u8]>,
    expires_at: Instant,
    size_bytes: usize,
    /// Sequence of the most recent use
    sequence: AtomicU64,
    /// Sequence under which the record is filed in the LRU index
    indexed_sequence: u64,
}

impl CacheRecord {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

struct CacheState {
    records: HashMap<String, CacheRecord>,
    lru: BTreeMap<u64, String>,
    expiry: BTreeSet<(Instant, String)>,
    bytes_used: usize,
}

impl CacheState {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
            lru: BTreeMap::new(),
            expiry: BTreeSet::new(),
            bytes_used: 0,
        }
    }

    /// Unlink a record from every index
    fn detach(&mut self, key: &str) -> Option<CacheRecord> {
        let record = self.records.remove(key)?;
        self.lru.remove(&record.indexed_sequence);
        self.expiry.remove(&(record.expires_at, key.to_string()));
        self.bytes_used -= record.size_bytes;
        Some(record)
    }

    /// Evict one record: the earliest expired if any, otherwise the LRU
    fn evict_one(&mut self, now: Instant) -> Option<(String, EvictionCause)> {
        if let Some((expires_at, key)) = self.expiry.first().cloned() {
            if expires_at <= now {
                self.detach(&key);
                return Some((key, EvictionCause::Expired));
            }
        }

        while let Some((seq, key)) = self.lru.pop_first() {
            let current = match self.records.get(&key) {
                Some(record) => record.sequence.load(Ordering::Relaxed),
                None => continue,
            };
            if current != seq {
                // Used since it was filed; re-file under its latest sequence
                self.lru.insert(current, key.clone());
                if let Some(record) = self.records.get_mut(&key) {
                    record.indexed_sequence = current;
                }
                continue;
            }
            // Already popped from the LRU map; detach the rest
            if let Some(record) = self.records.remove(&key) {
                self.expiry.remove(&(record.expires_at, key.clone()));
                self.bytes_used -= record.size_bytes;
            }
            return Some((key, EvictionCause::Capacity));
        }

        None
    }
}

/// Bounded key/value store with per-record TTL
pub struct CacheTier {
    state: RwLock<CacheState>,
    config: CacheConfig,
    next_sequence: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    listeners: RwLock<Vec<Arc<dyn EvictionListener>>>,
}

impl CacheTier {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: RwLock::new(CacheState::new()),
            config,
            next_sequence: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener for evicted records
    pub fn add_listener(&self, listener: Arc<dyn EvictionListener>) {
        self.listeners.write().push(listener);
    }

    fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn record_size(key: &str, value: &[u8]) -> usize {
        key.len() + value.len()
    }

    /// Insert or overwrite a record
    ///
    /// Overwriting resets the expiry from `ttl` and counts as a use. Capacity
    /// pressure evicts other records; only an oversized record is rejected.
    pub fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let size_bytes = Self::record_size(key, &value);
        let max = self.config.max_record_bytes.min(self.config.max_bytes);
        if size_bytes > max {
            return Err(CacheError::TooLarge {
                size: size_bytes,
                max,
            });
        }

        let now = Instant::now();
        let expires_at = expiry_after(now, ttl);
        let mut evicted = Vec::new();
        {
            let mut state = self.state.write();
            state.detach(key);

            while !state.records.is_empty()
                && (state.records.len() + 1 > self.config.max_entries
                    || state.bytes_used + size_bytes > self.config.max_bytes)
            {
                match state.evict_one(now) {
                    Some(e) => evicted.push(e),
                    None => break,
                }
            }

            let sequence = self.next_sequence();
            state.lru.insert(sequence, key.to_string());
            state.expiry.insert((expires_at, key.to_string()));
            state.bytes_used += size_bytes;
            state.records.insert(
                key.to_string(),
                CacheRecord {
                    value: value.into(),
                    expires_at,
                    size_bytes,
                    sequence: AtomicU64::new(sequence),
                    indexed_sequence: sequence,
                },
            );
        }

        self.notify(evicted);
        Ok(())
    }

    /// Read a record, marking it recently used
    ///
    /// Returns an Arc clone of the stored bytes.
    pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        let now = Instant::now();
        {
            let state = self.state.read();
            match state.records.get(key) {
                Some(record) if !record.is_expired(now) => {
                    record
                        .sequence
                        .store(self.next_sequence(), Ordering::Relaxed);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(record.value.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Expired: drop it lazily
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.expire_key(key, now);
        None
    }

    /// Check presence without touching recency or counters
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.state
            .read()
            .records
            .get(key)
            .is_some_and(|r| !r.is_expired(now))
    }

    /// Remove a record; returns whether a live record was present
    pub fn remove(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut state = self.state.write();
        match state.detach(key) {
            Some(record) => !record.is_expired(now),
            None => false,
        }
    }

    /// Reset a record's expiry and mark it recently used
    pub fn touch(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut state = self.state.write();

        let (old_expiry, expired) = match state.records.get(key) {
            Some(record) => (record.expires_at, record.is_expired(now)),
            None => return false,
        };
        if expired {
            drop(state);
            self.expire_key(key, now);
            return false;
        }

        let expires_at = expiry_after(now, ttl);
        let sequence = self.next_sequence();
        state.expiry.remove(&(old_expiry, key.to_string()));
        state.expiry.insert((expires_at, key.to_string()));
        if let Some(record) = state.records.get_mut(key) {
            record.expires_at = expires_at;
            record.sequence.store(sequence, Ordering::Relaxed);
        }
        true
    }

    /// Remove up to `max_batch` expired records; returns how many were removed
    ///
    /// Holds the write lock for one batch only. Callers sweeping the whole
    /// cache loop until the return value is below `max_batch`.
    pub fn sweep_expired(&self, max_batch: usize) -> usize {
        let now = Instant::now();
        let mut evicted = Vec::new();
        {
            let mut state = self.state.write();
            while evicted.len() < max_batch {
                let key = match state.expiry.first() {
                    Some((expires_at, key)) if *expires_at <= now => key.clone(),
                    _ => break,
                };
                state.detach(&key);
                evicted.push((key, EvictionCause::Expired));
            }
        }
        let count = evicted.len();
        self.notify(evicted);
        count
    }

    fn expire_key(&self, key: &str, now: Instant) {
        let removed = {
            let mut state = self.state.write();
            match state.records.get(key) {
                Some(record) if record.is_expired(now) => state.detach(key).is_some(),
                _ => false,
            }
        };
        if removed {
            self.notify(vec![(key.to_string(), EvictionCause::Expired)]);
        }
    }

    fn notify(&self, evicted: Vec<(String, EvictionCause)>) {
        if evicted.is_empty() {
            return;
        }
        for (_, cause) in &evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            if *cause == EvictionCause::Expired {
                self.expirations.fetch_add(1, Ordering::Relaxed);
            }
        }
        let listeners = self.listeners.read().clone();
        for (key, cause) in &evicted {
            tracing::debug!(key = %key, ?cause, "cache record evicted");
            for listener in &listeners {
                listener.on_evict(key, *cause);
            }
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = {
            let state = self.state.read();
            (state.records.len(), state.bytes_used)
        };
        CacheStats {
            entries,
            bytes,
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            eviction_count: self.evictions.load(Ordering::Relaxed),
            expired_count: self.expirations.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the number of records in the cache
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CacheTier {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
