//! Composite relevance ranking
//!
//! score = w_sem * semantic + w_rec * recency + w_freq * frequency
//!
//! The engine never mutates entries. Scoring calls for one search run
//! concurrently inside the caller's future, so dropping that future cancels
//! every outstanding call.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use super::SemanticScorer;
use crate::config::{MnemosConfig, RankingWeights};
use crate::types::MemoryEntry;

/// Configuration for the ranking engine
#[derive(Debug, Clone)]
pub struct RankingConfig {
    pub weights: RankingWeights,
    /// Half-life of the recency decay
    pub recency_half_life: Duration,
    /// Access count at which the frequency term saturates
    pub frequency_cap: u64,
    /// Timeout for one scorer call
    pub scoring_timeout: Duration,
    /// Scorer calls in flight per search
    pub concurrency: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self::from(&MnemosConfig::default())
    }
}

impl From<&MnemosConfig> for RankingConfig {
    fn from(config: &MnemosConfig) -> Self {
        Self {
            weights: config.ranking_weights,
            recency_half_life: Duration::from_secs(config.recency_half_life_secs),
            frequency_cap: config.frequency_cap,
            scoring_timeout: config.scoring_timeout(),
            concurrency: config.scoring_concurrency.max(1),
        }
    }
}

/// Individual components of a composite score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub semantic: f64,
    pub recency: f64,
    pub frequency: f64,
}

/// A scored candidate
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub memory: MemoryEntry,
    pub score: f64,
    pub components: ScoreComponents,
    /// The scorer failed or timed out for this candidate
    pub degraded: bool,
}

/// Signature of a query for relevance caching
pub fn query_signature(query: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    query.to_lowercase().trim().hash(&mut hasher);
    hasher.finish()
}

/// Ranks candidates by composite relevance
pub struct RankingEngine {
    scorer: Arc<dyn SemanticScorer>,
    config: RankingConfig,
}

impl RankingEngine {
    pub fn new(scorer: Arc<dyn SemanticScorer>, config: RankingConfig) -> Self {
        Self { scorer, config }
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Exponential decay of time since last access (or creation)
    pub fn recency(&self, entry: &MemoryEntry, now: DateTime<Utc>) -> f64 {
        let elapsed = (now - entry.recency_anchor())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();
        let half_life = self.config.recency_half_life.as_secs_f64();
        if half_life <= 0.0 {
            return 0.0;
        }
        (-elapsed / half_life).exp()
    }

    /// Log-scaled access frequency, saturating at the configured cap
    pub fn frequency(&self, access_count: u64) -> f64 {
        if self.config.frequency_cap == 0 {
            return if access_count > 0 { 1.0 } else { 0.0 };
        }
        let n = access_count as f64;
        let cap = self.config.frequency_cap as f64;
        ((1.0 + n).ln() / (1.0 + cap).ln()).min(1.0)
    }

    fn combine(&self, c: &ScoreComponents) -> f64 {
        let w = &self.config.weights;
        let score = w.semantic * c.semantic + w.recency * c.recency + w.frequency * c.frequency;
        if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Score one candidate's semantic relevance, degrading to 0 on failure
    async fn semantic(&self, query: &str, signature: u64, entry: &MemoryEntry) -> (f64, bool) {
        if let Some(cached) = entry.relevance_cache {
            if cached.query_hash == signature {
                return (cached.semantic, false);
            }
        }

        let call = self.scorer.score(query, &entry.content);
        match tokio::time::timeout(self.config.scoring_timeout, call).await {
            Ok(Ok(score)) if score.is_finite() => (score.clamp(0.0, 1.0), false),
            Ok(Ok(score)) => {
                tracing::warn!(
                    memory_id = %entry.id,
                    scorer = self.scorer.name(),
                    "scorer returned non-finite value {}, using 0",
                    score
                );
                (0.0, true)
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    memory_id = %entry.id,
                    scorer = self.scorer.name(),
                    "semantic scoring failed, using 0: {}",
                    e
                );
                (0.0, true)
            }
            Err(_) => {
                tracing::warn!(
                    memory_id = %entry.id,
                    scorer = self.scorer.name(),
                    timeout_ms = self.config.scoring_timeout.as_millis() as u64,
                    "semantic scoring timed out, using 0"
                );
                (0.0, true)
            }
        }
    }

    /// Rank candidates against a query at the current time
    pub async fn rank(&self, query: &str, candidates: Vec<MemoryEntry>) -> Vec<RankedCandidate> {
        self.rank_at(query, candidates, Utc::now()).await
    }

    /// Rank candidates against a query at a fixed time
    ///
    /// Results are ordered by score descending; equal scores put the most
    /// recently created entry first.
    pub async fn rank_at(
        &self,
        query: &str,
        candidates: Vec<MemoryEntry>,
        now: DateTime<Utc>,
    ) -> Vec<RankedCandidate> {
        let signature = query_signature(query);

        let mut ranked: Vec<RankedCandidate> = stream::iter(candidates)
            .map(|memory| async move {
                let (semantic, degraded) =
                    self.semantic(query, signature, &memory).await;
                let components = ScoreComponents {
                    semantic,
                    recency: self.recency(&memory, now),
                    frequency: self.frequency(memory.access_count),
                };
                let score = self.combine(&components);
                RankedCandidate {
                    memory,
                    score,
                    components,
                    degraded,
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        ranked.sort_by(compare_ranked);
        ranked
    }
}

/// Score descending, then `created_at` descending, then id for stability
fn compare_ranked(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
        .then_with(|| a.memory.id.cmp(&b.memory.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::ranking::FnScorer;
    use crate::types::{MemoryType, RelevanceCache};
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use uuid::Uuid;

    fn entry(content: &str, created_at: DateTime<Utc>) -> MemoryEntry {
        MemoryEntry {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            content: content.into(),
            memory_type: MemoryType::Fact,
            tags: vec![],
            metadata: HashMap::new(),
            created_at,
            updated_at: created_at,
            last_accessed_at: None,
            access_count: 0,
            relevance_cache: None,
        }
    }

    fn engine_with<F>(f: F) -> RankingEngine
    where
        F: Fn(&str, &str) -> crate::error::Result<f64> + Send + Sync + 'static,
    {
        RankingEngine::new(Arc::new(FnScorer::new(f)), RankingConfig::default())
    }

    #[test]
    fn test_recency_decay() {
        let engine = engine_with(|_, _| Ok(0.0));
        let now = Utc::now();

        let fresh = entry("a", now);
        assert!((engine.recency(&fresh, now) - 1.0).abs() < 1e-9);

        let week_old = entry("b", now - ChronoDuration::days(7));
        let r = engine.recency(&week_old, now);
        assert!((r - (-1.0f64).exp()).abs() < 1e-9, "got {}", r);

        // Access time takes precedence over creation time
        let mut accessed = entry("c", now - ChronoDuration::days(30));
        accessed.last_accessed_at = Some(now);
        assert!((engine.recency(&accessed, now) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_frequency_saturates() {
        let engine = engine_with(|_, _| Ok(0.0));
        assert_eq!(engine.frequency(0), 0.0);
        assert!((engine.frequency(50) - 1.0).abs() < 1e-9);
        assert_eq!(engine.frequency(5000), 1.0);
        assert!(engine.frequency(5) > engine.frequency(1));
    }

    #[tokio::test]
    async fn test_semantic_dominates_ordering() {
        let engine = engine_with(|_, content| Ok(if content.contains("tea") { 0.9 } else { 0.1 }));
        let now = Utc::now();
        let ranked = engine
            .rank_at(
                "drinks",
                vec![entry("likes coffee", now), entry("likes tea", now)],
                now,
            )
            .await;
        assert_eq!(ranked[0].memory.content, "likes tea");
        assert!(ranked[0].score > ranked[1].score);
        assert!(ranked.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[tokio::test]
    async fn test_equal_semantic_prefers_newer() {
        let engine = engine_with(|_, _| Ok(0.5));
        let now = Utc::now();
        let older = entry("older", now - ChronoDuration::hours(1));
        let newer = entry("newer", now);
        let ranked = engine.rank_at("q", vec![older, newer], now).await;
        assert_eq!(ranked[0].memory.content, "newer");
    }

    #[tokio::test]
    async fn test_exact_tie_orders_by_created_at_desc() {
        // Zero recency/frequency weight makes the composite scores identical
        let engine = RankingEngine::new(
            Arc::new(FnScorer::new(|_, _| Ok(0.5))),
            RankingConfig {
                weights: RankingWeights {
                    semantic: 1.0,
                    recency: 0.0,
                    frequency: 0.0,
                },
                ..Default::default()
            },
        );
        let now = Utc::now();
        let ranked = engine
            .rank_at(
                "q",
                vec![
                    entry("first", now - ChronoDuration::minutes(2)),
                    entry("third", now),
                    entry("second", now - ChronoDuration::minutes(1)),
                ],
                now,
            )
            .await;
        let order: Vec<_> = ranked.iter().map(|r| r.memory.content.as_str()).collect();
        assert_eq!(order, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_scorer_failure_degrades() {
        let engine = engine_with(|_, _| Err(StoreError::ScoringUnavailable("down".into())));
        let now = Utc::now();
        let mut popular = entry("popular", now - ChronoDuration::days(1));
        popular.access_count = 40;
        let ranked = engine
            .rank_at("q", vec![entry("plain", now - ChronoDuration::days(1)), popular], now)
            .await;

        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.degraded && r.components.semantic == 0.0));
        assert_eq!(ranked[0].memory.content, "popular");
    }

    #[tokio::test]
    async fn test_out_of_range_scores_clamped() {
        let engine = engine_with(|_, content| Ok(if content == "hi" { 7.0 } else { -3.0 }));
        let now = Utc::now();
        let ranked = engine
            .rank_at("q", vec![entry("hi", now), entry("lo", now)], now)
            .await;
        assert_eq!(ranked[0].components.semantic, 1.0);
        assert_eq!(ranked[1].components.semantic, 0.0);
    }

    #[tokio::test]
    async fn test_relevance_cache_skips_scorer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let engine = engine_with(move |_, _| {
            counter.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(0.2)
        });
        let now = Utc::now();
        let mut cached = entry("cached", now);
        cached.relevance_cache = Some(RelevanceCache {
            query_hash: query_signature("Tea"),
            semantic: 0.8,
        });

        let ranked = engine.rank_at("  tea ", vec![cached], now).await;
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
        assert_eq!(ranked[0].components.semantic, 0.8);
    }

    struct SlowScorer;

    #[async_trait::async_trait]
    impl SemanticScorer for SlowScorer {
        async fn score(&self, _query: &str, _content: &str) -> crate::error::Result<f64> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1.0)
        }
    }

    #[tokio::test]
    async fn test_timeout_degrades() {
        let engine = RankingEngine::new(
            Arc::new(SlowScorer),
            RankingConfig {
                scoring_timeout: Duration::from_millis(20),
                ..Default::default()
            },
        );
        let now = Utc::now();
        let started = std::time::Instant::now();
        let ranked = engine.rank_at("q", vec![entry("a", now)], now).await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(ranked[0].degraded);
        assert_eq!(ranked[0].components.semantic, 0.0);
    }
}
