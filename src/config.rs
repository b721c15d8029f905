//! Runtime configuration for the memory store

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::MAX_TTL;
use crate::error::{Result, StoreError};
use crate::types::DEFAULT_MAX_CONTENT_BYTES;

/// Hard ceiling on the number of search results
pub const SEARCH_LIMIT_CEILING: usize = 50;

/// Weights of the composite relevance score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub semantic: f64,
    pub recency: f64,
    pub frequency: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            recency: 0.2,
            frequency: 0.1,
        }
    }
}

impl std::str::FromStr for RankingWeights {
    type Err = String;

    /// Parse `w_sem,w_rec,w_freq`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(format!(
                "expected three comma-separated weights (w_sem,w_rec,w_freq), got '{}'",
                s
            ));
        }
        let parse = |p: &str| {
            p.parse::<f64>()
                .map_err(|e| format!("invalid weight '{}': {}", p, e))
        };
        Ok(Self {
            semantic: parse(parts[0])?,
            recency: parse(parts[1])?,
            frequency: parse(parts[2])?,
        })
    }
}

/// Configuration for the memory store, cache tier and ranking engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MnemosConfig {
    /// Per-user quota (0 rejects every add)
    pub max_memories_per_user: usize,
    /// Maximum content size in bytes
    pub max_memory_size_bytes: usize,
    /// Time-to-live of a memory record (sliding on reads)
    pub memory_ttl_seconds: u64,
    /// Default number of search results
    pub search_result_limit: usize,
    /// Cache capacity in records
    pub cache_capacity_entries: usize,
    /// Cache capacity in bytes
    pub cache_capacity_bytes: usize,
    /// Largest single record the cache accepts
    pub cache_max_record_bytes: usize,
    /// Timeout for one semantic scoring call
    pub semantic_score_timeout_ms: u64,
    /// Composite score weights
    pub ranking_weights: RankingWeights,
    /// Half-life of the recency term
    pub recency_half_life_secs: u64,
    /// Access count at which the frequency term saturates
    pub frequency_cap: u64,
    /// Concurrent scoring calls per search
    pub scoring_concurrency: usize,
    /// Interval between expiry sweeps (0 disables the sweeper)
    pub sweep_interval_secs: u64,
    /// Records examined per sweep batch
    pub sweep_batch_size: usize,
}

impl Default for MnemosConfig {
    fn default() -> Self {
        Self {
            max_memories_per_user: 1000,
            max_memory_size_bytes: DEFAULT_MAX_CONTENT_BYTES,
            memory_ttl_seconds: 90 * 24 * 60 * 60,
            search_result_limit: 10,
            cache_capacity_entries: 100_000,
            cache_capacity_bytes: 256 * 1024 * 1024,
            cache_max_record_bytes: 64 * 1024,
            semantic_score_timeout_ms: 200,
            ranking_weights: RankingWeights::default(),
            recency_half_life_secs: 7 * 24 * 60 * 60,
            frequency_cap: 50,
            scoring_concurrency: 8,
            sweep_interval_secs: 60,
            sweep_batch_size: 256,
        }
    }
}

impl MnemosConfig {
    pub fn memory_ttl(&self) -> Duration {
        Duration::from_secs(self.memory_ttl_seconds)
    }

    pub fn scoring_timeout(&self) -> Duration {
        Duration::from_millis(self.semantic_score_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Clamp a requested result count to `1..=SEARCH_LIMIT_CEILING`
    pub fn effective_search_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.search_result_limit)
            .clamp(1, SEARCH_LIMIT_CEILING)
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<()> {
        if self.max_memory_size_bytes == 0 {
            return Err(StoreError::Config(
                "max_memory_size_bytes must be positive".into(),
            ));
        }
        if self.cache_capacity_entries == 0 || self.cache_capacity_bytes == 0 {
            return Err(StoreError::Config(
                "cache capacity (entries and bytes) must be positive".into(),
            ));
        }
        if self.cache_max_record_bytes < self.max_memory_size_bytes {
            return Err(StoreError::Config(format!(
                "cache_max_record_bytes ({}) must be at least max_memory_size_bytes ({})",
                self.cache_max_record_bytes, self.max_memory_size_bytes
            )));
        }
        if self.memory_ttl_seconds == 0 {
            return Err(StoreError::Config("memory_ttl_seconds must be positive".into()));
        }
        if self.memory_ttl() > MAX_TTL {
            return Err(StoreError::Config(format!(
                "memory_ttl_seconds must be at most {}",
                MAX_TTL.as_secs()
            )));
        }
        if self.sweep_interval() > MAX_TTL {
            return Err(StoreError::Config(format!(
                "sweep_interval_secs must be at most {}",
                MAX_TTL.as_secs()
            )));
        }
        let w = &self.ranking_weights;
        if [w.semantic, w.recency, w.frequency]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(StoreError::Config(
                "ranking weights must be finite and non-negative".into(),
            ));
        }
        if self.recency_half_life_secs == 0 {
            return Err(StoreError::Config(
                "recency_half_life_secs must be positive".into(),
            ));
        }
        if self.scoring_concurrency == 0 || self.sweep_batch_size == 0 {
            return Err(StoreError::Config(
                "scoring_concurrency and sweep_batch_size must be positive".into(),
            ));
        }
        Ok(())
    }
}
