//! Rolling statistics for the memory store
//!
//! Every counter is an atomic updated in place; snapshots read them without
//! taking any lock that writers hold across an operation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheStats;
use crate::types::MemoryType;

/// Store operations with tracked latency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Get,
    Search,
    Update,
    Delete,
    List,
}

impl Operation {
    const ALL: [Operation; 6] = [
        Operation::Add,
        Operation::Get,
        Operation::Search,
        Operation::Update,
        Operation::Delete,
        Operation::List,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Get => "get",
            Operation::Search => "search",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::List => "list",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Default)]
struct LatencyCounter {
    count: AtomicU64,
    total_micros: AtomicU64,
    max_micros: AtomicU64,
}

impl LatencyCounter {
    fn record(&self, elapsed: Duration) {
        let micros = elapsed.as_micros().min(u64::MAX as u128) as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_micros.load(Ordering::Relaxed);
        LatencySnapshot {
            count,
            avg_ms: if count == 0 {
                0.0
            } else {
                total as f64 / count as f64 / 1000.0
            },
            max_ms: self.max_micros.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }
}

#[derive(Debug, Default)]
struct TypeCounters([AtomicI64; 5]);

impl TypeCounters {
    fn add(&self, memory_type: MemoryType, delta: i64) {
        self.0[memory_type.index()].fetch_add(delta, Ordering::Relaxed);
    }

    fn total(&self) -> i64 {
        self.0.iter().map(|c| c.load(Ordering::Relaxed).max(0)).sum()
    }

    fn snapshot(&self) -> BTreeMap<String, i64> {
        MemoryType::ALL
            .iter()
            .map(|t| {
                (
                    t.as_str().to_string(),
                    self.0[t.index()].load(Ordering::Relaxed).max(0),
                )
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct UserCounters {
    by_type: TypeCounters,
    read_hits: AtomicU64,
    read_misses: AtomicU64,
    quota_evictions: AtomicU64,
    quota_rejections: AtomicU64,
    cache_evictions: AtomicU64,
    latency: LatencyCounter,
}

/// Latency summary for one operation kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySnapshot {
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

/// Per-user slice of the statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,
    pub total_memories: i64,
    pub memories_by_type: BTreeMap<String, i64>,
    /// Fraction of this user's reads that found the memory
    pub read_hit_rate: f64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub quota_evictions: u64,
    pub quota_rejections: u64,
    pub cache_evictions: u64,
}

/// Snapshot returned by `stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub started_at: DateTime<Utc>,
    pub total_memories: i64,
    pub memories_by_type: BTreeMap<String, i64>,
    pub cache: CacheStats,
    pub cache_hit_rate: f64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    /// Cache evictions of any record plus quota evictions
    pub eviction_count: u64,
    /// Memories dropped by the cache tier through expiry or capacity
    pub memory_eviction_count: u64,
    pub quota_eviction_count: u64,
    pub quota_rejection_count: u64,
    pub scoring_degraded_count: u64,
    pub operations: BTreeMap<String, LatencySnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserStats>,
}

/// Process-wide and per-user counters
#[derive(Debug)]
pub struct StatsAggregator {
    started_at: DateTime<Utc>,
    by_type: TypeCounters,
    quota_evictions: AtomicU64,
    quota_rejections: AtomicU64,
    memory_evictions: AtomicU64,
    scoring_degraded: AtomicU64,
    latency: LatencyCounter,
    operations: [LatencyCounter; 6],
    users: DashMap<String, Arc<UserCounters>>,
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            by_type: TypeCounters::default(),
            quota_evictions: AtomicU64::new(0),
            quota_rejections: AtomicU64::new(0),
            memory_evictions: AtomicU64::new(0),
            scoring_degraded: AtomicU64::new(0),
            latency: LatencyCounter::default(),
            operations: Default::default(),
            users: DashMap::new(),
        }
    }

    fn user(&self, user_id: &str) -> Arc<UserCounters> {
        if let Some(counters) = self.users.get(user_id) {
            return counters.clone();
        }
        self.users
            .entry(user_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Counters for a user that already holds or held memories
    fn existing_user(&self, user_id: &str) -> Option<Arc<UserCounters>> {
        self.users.get(user_id).map(|c| c.value().clone())
    }

    pub fn record_created(&self, user_id: &str, memory_type: MemoryType) {
        self.by_type.add(memory_type, 1);
        self.user(user_id).by_type.add(memory_type, 1);
    }

    pub fn record_removed(&self, user_id: &str, memory_type: MemoryType) {
        self.by_type.add(memory_type, -1);
        self.user(user_id).by_type.add(memory_type, -1);
    }

    /// A memory record dropped by the cache tier (expiry or capacity)
    pub fn record_cache_eviction(&self, user_id: &str, memory_type: MemoryType) {
        self.memory_evictions.fetch_add(1, Ordering::Relaxed);
        self.user(user_id)
            .cache_evictions
            .fetch_add(1, Ordering::Relaxed);
        self.record_removed(user_id, memory_type);
    }

    pub fn record_quota_eviction(&self, user_id: &str) {
        self.quota_evictions.fetch_add(1, Ordering::Relaxed);
        self.user(user_id)
            .quota_evictions
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_quota_rejection(&self, user_id: &str) {
        self.quota_rejections.fetch_add(1, Ordering::Relaxed);
        if let Some(user) = self.existing_user(user_id) {
            user.quota_rejections.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Reads by callers that never stored anything are not tracked per user
    pub fn record_read(&self, user_id: &str, found: bool) {
        let Some(user) = self.existing_user(user_id) else {
            return;
        };
        if found {
            user.read_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            user.read_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_scoring_degraded(&self, count: u64) {
        if count > 0 {
            self.scoring_degraded.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_latency(&self, user_id: &str, op: Operation, elapsed: Duration) {
        self.latency.record(elapsed);
        self.operations[op.index()].record(elapsed);
        if let Some(user) = self.existing_user(user_id) {
            user.latency.record(elapsed);
        }
    }

    /// Build a snapshot; `cache` comes from the cache tier
    pub fn snapshot(&self, cache: CacheStats, user_id: Option<&str>) -> Stats {
        let latency = self.latency.snapshot();
        let quota_evictions = self.quota_evictions.load(Ordering::Relaxed);

        let user = user_id.map(|id| {
            match self.existing_user(id) {
                Some(c) => {
                    let hits = c.read_hits.load(Ordering::Relaxed);
                    let misses = c.read_misses.load(Ordering::Relaxed);
                    let lat = c.latency.snapshot();
                    UserStats {
                        user_id: id.to_string(),
                        total_memories: c.by_type.total(),
                        memories_by_type: c.by_type.snapshot(),
                        read_hit_rate: if hits + misses == 0 {
                            0.0
                        } else {
                            hits as f64 / (hits + misses) as f64
                        },
                        avg_latency_ms: lat.avg_ms,
                        max_latency_ms: lat.max_ms,
                        quota_evictions: c.quota_evictions.load(Ordering::Relaxed),
                        quota_rejections: c.quota_rejections.load(Ordering::Relaxed),
                        cache_evictions: c.cache_evictions.load(Ordering::Relaxed),
                    }
                }
                None => UserStats {
                    user_id: id.to_string(),
                    memories_by_type: TypeCounters::default().snapshot(),
                    ..Default::default()
                },
            }
        });

        Stats {
            started_at: self.started_at,
            total_memories: self.by_type.total(),
            memories_by_type: self.by_type.snapshot(),
            cache_hit_rate: cache.hit_rate(),
            eviction_count: cache.eviction_count + quota_evictions,
            cache,
            avg_latency_ms: latency.avg_ms,
            max_latency_ms: latency.max_ms,
            memory_eviction_count: self.memory_evictions.load(Ordering::Relaxed),
            quota_eviction_count: quota_evictions,
            quota_rejection_count: self.quota_rejections.load(Ordering::Relaxed),
            scoring_degraded_count: self.scoring_degraded.load(Ordering::Relaxed),
            operations: Operation::ALL
                .iter()
                .map(|op| (op.as_str().to_string(), self.operations[op.index()].snapshot()))
                .collect(),
            user,
        }
    }
}
