//! User-scoped memory store on top of the cache tier
//!
//! Records live under `memory:{user_id}:{id}`; each user's index is mirrored
//! under `index:{user_id}`. Every operation on a user runs under that user's
//! lock, taken from a lock map keyed by `user_id`, so different users never
//! contend. The lock is never held across an await point: `search` collects
//! candidates, releases the lock while scoring, then re-locks to record the
//! reads.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::persistence::PersistenceHook;
use super::user_index::UserIndex;
use crate::cache::{CacheConfig, CacheTier, EvictionCause, EvictionListener};
use crate::config::MnemosConfig;
use crate::error::{Result, StoreError};
use crate::ranking::{query_signature, RankingConfig, RankingEngine, SemanticScorer};
use crate::stats::{Operation, Stats, StatsAggregator};
use crate::types::{
    normalize_tags, validate_content, validate_user_id, ListOptions, MemoryEntry, MemoryId,
    MemoryUpdate, NewMemory, RelevanceCache, ScoredMemory, SearchOptions,
};

const MEMORY_PREFIX: &str = "memory:";
const INDEX_PREFIX: &str = "index:";

fn memory_key(user_id: &str, id: &MemoryId) -> String {
    format!("{}{}:{}", MEMORY_PREFIX, user_id, id)
}

fn index_key(user_id: &str) -> String {
    format!("{}{}", INDEX_PREFIX, user_id)
}

/// Split `memory:{user_id}:{id}`; user ids may themselves contain ':'
fn parse_memory_key(key: &str) -> Option<(&str, MemoryId)> {
    let rest = key.strip_prefix(MEMORY_PREFIX)?;
    let (user_id, id) = rest.rsplit_once(':')?;
    Some((user_id, Uuid::parse_str(id).ok()?))
}

/// Memory records evicted by the cache, waiting to leave their user's index
#[derive(Default)]
struct PendingEvictions {
    by_user: DashMap<String, Vec<MemoryId>>,
}

impl EvictionListener for PendingEvictions {
    fn on_evict(&self, key: &str, cause: EvictionCause) {
        if let Some((user_id, id)) = parse_memory_key(key) {
            tracing::debug!(user_id, memory_id = %id, ?cause, "memory evicted by cache tier");
            self.by_user.entry(user_id.to_string()).or_default().push(id);
        }
    }
}

impl PendingEvictions {
    fn take(&self, user_id: &str) -> Vec<MemoryId> {
        self.by_user
            .remove(user_id)
            .map(|(_, ids)| ids)
            .unwrap_or_default()
    }

    fn users(&self) -> Vec<String> {
        self.by_user.iter().map(|e| e.key().clone()).collect()
    }
}

/// Cache-backed, user-scoped semantic memory store
pub struct MemoryStore {
    config: MnemosConfig,
    cache: Arc<CacheTier>,
    ranking: RankingEngine,
    stats: Arc<StatsAggregator>,
    users: DashMap<String, Arc<Mutex<UserIndex>>>,
    pending: Arc<PendingEvictions>,
    persistence: Option<Arc<dyn PersistenceHook>>,
    sequence: AtomicU64,
}

impl MemoryStore {
    /// Create a store with a fresh cache tier
    pub fn new(config: MnemosConfig, scorer: Arc<dyn SemanticScorer>) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(CacheTier::new(CacheConfig {
            max_entries: config.cache_capacity_entries,
            max_bytes: config.cache_capacity_bytes,
            max_record_bytes: config.cache_max_record_bytes,
        }));
        Self::with_cache(config, scorer, cache)
    }

    /// Create a store over an existing cache tier
    pub fn with_cache(
        config: MnemosConfig,
        scorer: Arc<dyn SemanticScorer>,
        cache: Arc<CacheTier>,
    ) -> Result<Self> {
        config.validate()?;
        let pending = Arc::new(PendingEvictions::default());
        cache.add_listener(pending.clone());
        let ranking = RankingEngine::new(scorer, RankingConfig::from(&config));

        Ok(Self {
            config,
            cache,
            ranking,
            stats: Arc::new(StatsAggregator::new()),
            users: DashMap::new(),
            pending,
            persistence: None,
            sequence: AtomicU64::new(1),
        })
    }

    /// Create a store that writes through to `hook`, rehydrated from it
    pub fn with_persistence(
        config: MnemosConfig,
        scorer: Arc<dyn SemanticScorer>,
        hook: Arc<dyn PersistenceHook>,
    ) -> Result<Self> {
        let mut store = Self::new(config, scorer)?;
        let entries = hook.load_all()?;
        let count = entries.len();
        for entry in entries {
            store.restore(entry)?;
        }
        store.persistence = Some(hook);

        // The quota may have been lowered since these entries were written
        let users: Vec<String> = store.users.iter().map(|e| e.key().clone()).collect();
        let mut evicted = 0usize;
        for user_id in users {
            if let Some(slot) = store.existing_slot(&user_id) {
                let mut index = slot.lock();
                evicted += store.enforce_quota(&user_id, &mut index, None);
                store.persist_index(&user_id, &index);
            }
        }
        tracing::info!(count, evicted, "rehydrated memory store from persistence hook");
        Ok(store)
    }

    /// Evict least recently accessed memories until the user fits the quota
    fn enforce_quota(&self, user_id: &str, index: &mut UserIndex, keep: Option<&MemoryId>) -> usize {
        let mut evicted = 0;
        while index.len() > self.config.max_memories_per_user {
            let Some(victim) = index.least_recently_accessed(keep) else {
                break;
            };
            self.remove_locked(user_id, index, &victim);
            self.stats.record_quota_eviction(user_id);
            tracing::debug!(user_id, memory_id = %victim, "quota eviction");
            evicted += 1;
        }
        evicted
    }

    fn restore(&self, entry: MemoryEntry) -> Result<()> {
        let slot = self.user_slot(&entry.user_id);
        let mut index = slot.lock();
        let bytes = serde_json::to_vec(&entry)?;
        self.cache.put(
            &memory_key(&entry.user_id, &entry.id),
            bytes,
            self.config.memory_ttl(),
        )?;
        index.insert(&entry, self.next_seq());
        self.stats.record_created(&entry.user_id, entry.memory_type);
        self.persist_index(&entry.user_id, &index);
        Ok(())
    }

    pub fn config(&self) -> &MnemosConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheTier> {
        &self.cache
    }

    pub fn stats_aggregator(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Lock slot for a user, created on first write
    fn user_slot(&self, user_id: &str) -> Arc<Mutex<UserIndex>> {
        if let Some(slot) = self.users.get(user_id) {
            return slot.clone();
        }
        self.users
            .entry(user_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Lock slot for a user without creating one
    fn existing_slot(&self, user_id: &str) -> Option<Arc<Mutex<UserIndex>>> {
        self.users.get(user_id).map(|slot| slot.clone())
    }

    /// Drop ids the cache tier evicted since the last look at this index
    fn reconcile(&self, user_id: &str, index: &mut UserIndex) {
        let evicted = self.pending.take(user_id);
        if evicted.is_empty() {
            return;
        }
        let mut removed = 0usize;
        for id in evicted {
            if let Some(entry) = index.remove(&id) {
                self.stats.record_cache_eviction(user_id, entry.memory_type);
                if let Some(hook) = &self.persistence {
                    if let Err(e) = hook.remove(user_id, id) {
                        tracing::error!(user_id, memory_id = %id, "persistence remove failed: {}", e);
                    }
                }
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::warn!(user_id, removed, "cache tier evicted memories");
            self.persist_index(user_id, index);
        }
    }

    /// Reconcile every user with outstanding evictions
    pub fn reconcile_all(&self) {
        for user_id in self.pending.users() {
            match self.existing_slot(&user_id) {
                Some(slot) => {
                    let mut index = slot.lock();
                    self.reconcile(&user_id, &mut index);
                }
                None => {
                    self.pending.take(&user_id);
                }
            }
        }
    }

    /// Mirror the index into the cache tier
    fn persist_index(&self, user_id: &str, index: &UserIndex) {
        let ids = index.persisted_ids();
        let result = serde_json::to_vec(&ids)
            .map_err(StoreError::from)
            .and_then(|bytes| {
                self.cache
                    .put(&index_key(user_id), bytes, self.config.memory_ttl())
                    .map_err(StoreError::from)
            });
        if let Err(e) = result {
            tracing::warn!(user_id, "failed to mirror user index: {}", e);
        }
    }

    fn persist_entry(&self, entry: &MemoryEntry) {
        if let Some(hook) = &self.persistence {
            if let Err(e) = hook.save(entry) {
                tracing::error!(user_id = %entry.user_id, memory_id = %entry.id, "persistence save failed: {}", e);
            }
        }
    }

    fn write_entry(&self, entry: &MemoryEntry) -> Result<()> {
        let bytes = serde_json::to_vec(entry)?;
        self.cache.put(
            &memory_key(&entry.user_id, &entry.id),
            bytes,
            self.config.memory_ttl(),
        )?;
        Ok(())
    }

    /// Load an indexed entry, pruning it from the index if the cache lost it
    fn load_indexed(&self, user_id: &str, index: &mut UserIndex, id: &MemoryId) -> Result<Option<MemoryEntry>> {
        let Some(bytes) = self.cache.get(&memory_key(user_id, id)) else {
            if let Some(entry) = index.remove(id) {
                self.stats.record_cache_eviction(user_id, entry.memory_type);
                // The eviction may also be queued; it is a no-op once removed
                self.persist_index(user_id, index);
            }
            return Ok(None);
        };
        let entry: MemoryEntry = serde_json::from_slice(&bytes)?;
        if entry.user_id != user_id {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Remove one memory the caller already holds the lock for
    fn remove_locked(&self, user_id: &str, index: &mut UserIndex, id: &MemoryId) -> bool {
        let live = self.cache.remove(&memory_key(user_id, id));
        let Some(entry) = index.remove(id) else {
            return false;
        };
        if live {
            self.stats.record_removed(user_id, entry.memory_type);
        } else {
            self.stats.record_cache_eviction(user_id, entry.memory_type);
        }
        if let Some(hook) = &self.persistence {
            if let Err(e) = hook.remove(user_id, *id) {
                tracing::error!(user_id, memory_id = %id, "persistence remove failed: {}", e);
            }
        }
        live
    }

    fn not_found(id: &str) -> StoreError {
        StoreError::NotFound(format!("no memory with id '{}'", id))
    }

    fn timed<T>(&self, user_id: &str, op: Operation, started: Instant, result: Result<T>) -> Result<T> {
        self.stats.record_latency(user_id, op, started.elapsed());
        result
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Store a new memory, evicting the user's least recently accessed
    /// memory when the quota is full
    pub fn add(&self, user_id: &str, input: NewMemory) -> Result<MemoryEntry> {
        let started = Instant::now();
        let result = self.add_inner(user_id, input);
        self.timed(user_id, Operation::Add, started, result)
    }

    fn add_inner(&self, user_id: &str, input: NewMemory) -> Result<MemoryEntry> {
        validate_user_id(user_id)?;
        validate_content(&input.content, self.config.max_memory_size_bytes)?;
        let tags = normalize_tags(input.tags)?;

        let quota = self.config.max_memories_per_user;
        if quota == 0 {
            self.stats.record_quota_rejection(user_id);
            return Err(StoreError::QuotaExceeded(
                "max_memories_per_user is 0; no memories can be stored".to_string(),
            ));
        }

        let now = Utc::now();
        let entry = MemoryEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            content: input.content,
            memory_type: input.memory_type,
            tags,
            metadata: input.metadata,
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            access_count: 0,
            relevance_cache: None,
        };

        let slot = self.user_slot(user_id);
        let mut index = slot.lock();
        self.reconcile(user_id, &mut index);

        // Write first: an oversized record must fail before anything is evicted
        self.write_entry(&entry)?;
        index.insert(&entry, self.next_seq());
        self.stats.record_created(user_id, entry.memory_type);

        self.enforce_quota(user_id, &mut index, Some(&entry.id));

        // Our own write may have pushed this user's records out of the cache
        self.reconcile(user_id, &mut index);
        self.persist_index(user_id, &index);
        self.persist_entry(&entry);

        tracing::debug!(user_id, memory_id = %entry.id, memory_type = %entry.memory_type, "memory added");
        Ok(entry)
    }

    /// Read one memory, recording the access
    pub fn get(&self, user_id: &str, id: &str) -> Result<MemoryEntry> {
        let started = Instant::now();
        let result = self.get_inner(user_id, id);
        self.stats.record_read(user_id, result.is_ok());
        self.timed(user_id, Operation::Get, started, result)
    }

    fn get_inner(&self, user_id: &str, id: &str) -> Result<MemoryEntry> {
        let memory_id = Uuid::parse_str(id).map_err(|_| Self::not_found(id))?;
        let slot = self.existing_slot(user_id).ok_or_else(|| Self::not_found(id))?;
        let mut index = slot.lock();
        self.reconcile(user_id, &mut index);

        if !index.contains(&memory_id) {
            return Err(Self::not_found(id));
        }
        let mut entry = self
            .load_indexed(user_id, &mut index, &memory_id)?
            .ok_or_else(|| Self::not_found(id))?;

        let now = Utc::now();
        entry.mark_read(now);
        entry.relevance_cache = None;
        // Rewriting the record also slides its expiry
        self.write_entry(&entry)?;
        index.touch(&memory_id, now);
        self.persist_entry(&entry);
        Ok(entry)
    }

    /// Rank a user's memories against `query`
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<ScoredMemory>> {
        let started = Instant::now();
        let result = self.search_inner(user_id, query, options).await;
        self.timed(user_id, Operation::Search, started, result)
    }

    async fn search_inner(
        &self,
        user_id: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<ScoredMemory>> {
        if query.trim().is_empty() {
            return Err(StoreError::InvalidQuery("query: must not be empty".to_string()));
        }
        if !options.min_relevance.is_finite() {
            return Err(StoreError::InvalidQuery(
                "min_relevance: must be a finite number".to_string(),
            ));
        }
        let limit = self.config.effective_search_limit(options.limit);
        let min_relevance = options.min_relevance.clamp(0.0, 1.0);

        let Some(slot) = self.existing_slot(user_id) else {
            return Ok(Vec::new());
        };

        let candidates = {
            let mut index = slot.lock();
            self.reconcile(user_id, &mut index);
            let mut candidates = Vec::new();
            for id in index.ids(options.memory_type) {
                if let Some(entry) = self.load_indexed(user_id, &mut index, &id)? {
                    if entry.has_all_tags(&options.tags) {
                        candidates.push(entry);
                    }
                }
            }
            candidates
        };

        let candidate_count = candidates.len();
        let ranked = self.ranking.rank(query, candidates).await;
        let degraded = ranked.iter().filter(|r| r.degraded).count();
        self.stats.record_scoring_degraded(degraded as u64);

        let hits: Vec<_> = ranked
            .into_iter()
            .filter(|r| r.score >= min_relevance)
            .take(limit)
            .collect();

        let signature = query_signature(query);
        let now = Utc::now();
        let mut results = Vec::with_capacity(hits.len());
        {
            let mut index = slot.lock();
            self.reconcile(user_id, &mut index);
            for hit in hits {
                let id = hit.memory.id;
                if !index.contains(&id) {
                    // Deleted while we were scoring
                    continue;
                }
                let Some(mut entry) = self.load_indexed(user_id, &mut index, &id)? else {
                    continue;
                };
                entry.mark_read(now);
                entry.relevance_cache = (!hit.degraded).then_some(RelevanceCache {
                    query_hash: signature,
                    semantic: hit.components.semantic,
                });
                self.write_entry(&entry)?;
                index.touch(&id, now);
                self.persist_entry(&entry);
                results.push(ScoredMemory {
                    memory: entry,
                    score: hit.score,
                });
            }
        }

        tracing::debug!(
            user_id,
            candidates = candidate_count,
            returned = results.len(),
            degraded,
            "search complete"
        );
        Ok(results)
    }

    /// Replace content, tags or metadata of a memory
    pub fn update(&self, user_id: &str, id: &str, update: MemoryUpdate) -> Result<MemoryEntry> {
        let started = Instant::now();
        let result = self.update_inner(user_id, id, update);
        self.timed(user_id, Operation::Update, started, result)
    }

    fn update_inner(&self, user_id: &str, id: &str, update: MemoryUpdate) -> Result<MemoryEntry> {
        if update.is_empty() {
            return Err(StoreError::InvalidContent(
                "update: at least one of content, tags or metadata is required".to_string(),
            ));
        }
        if let Some(content) = &update.content {
            validate_content(content, self.config.max_memory_size_bytes)?;
        }
        let tags = update.tags.clone().map(normalize_tags).transpose()?;

        let memory_id = Uuid::parse_str(id).map_err(|_| Self::not_found(id))?;
        let slot = self.existing_slot(user_id).ok_or_else(|| Self::not_found(id))?;
        let mut index = slot.lock();
        self.reconcile(user_id, &mut index);

        if !index.contains(&memory_id) {
            return Err(Self::not_found(id));
        }
        let mut entry = self
            .load_indexed(user_id, &mut index, &memory_id)?
            .ok_or_else(|| Self::not_found(id))?;

        let changed = update.changed_fields();
        if let Some(content) = update.content {
            entry.content = content;
        }
        if let Some(tags) = tags {
            entry.tags = tags;
        }
        if let Some(metadata) = update.metadata {
            entry.metadata = metadata;
        }
        let now = Utc::now();
        entry.updated_at = now;
        entry.last_accessed_at = Some(now);
        entry.relevance_cache = None;

        self.write_entry(&entry)?;
        index.touch(&memory_id, now);
        self.persist_entry(&entry);

        tracing::debug!(user_id, memory_id = %memory_id, ?changed, "memory updated");
        Ok(entry)
    }

    /// Delete a memory; deleting it again reports `NotFound`
    pub fn delete(&self, user_id: &str, id: &str) -> Result<()> {
        let started = Instant::now();
        let result = self.delete_inner(user_id, id);
        self.timed(user_id, Operation::Delete, started, result)
    }

    fn delete_inner(&self, user_id: &str, id: &str) -> Result<()> {
        let memory_id = Uuid::parse_str(id).map_err(|_| Self::not_found(id))?;
        let slot = self.existing_slot(user_id).ok_or_else(|| Self::not_found(id))?;
        let mut index = slot.lock();
        self.reconcile(user_id, &mut index);

        if !index.contains(&memory_id) {
            return Err(Self::not_found(id));
        }
        let live = self.remove_locked(user_id, &mut index, &memory_id);
        self.persist_index(user_id, &index);
        if !live {
            // Expired between the index check and the remove
            return Err(Self::not_found(id));
        }

        tracing::debug!(user_id, memory_id = %memory_id, "memory deleted");
        Ok(())
    }

    /// Enumerate a user's memories without scoring or recording reads
    pub fn list(&self, user_id: &str, options: ListOptions) -> Result<Vec<MemoryEntry>> {
        let started = Instant::now();
        let result = self.list_inner(user_id, options);
        self.timed(user_id, Operation::List, started, result)
    }

    fn list_inner(&self, user_id: &str, options: ListOptions) -> Result<Vec<MemoryEntry>> {
        let Some(slot) = self.existing_slot(user_id) else {
            return Ok(Vec::new());
        };
        let mut index = slot.lock();
        self.reconcile(user_id, &mut index);

        let mut skipped = 0usize;
        let mut entries = Vec::new();
        for id in index.ordered(&options) {
            if entries.len() >= options.limit {
                break;
            }
            let Some(entry) = self.load_indexed(user_id, &mut index, &id)? else {
                continue;
            };
            if skipped < options.offset {
                skipped += 1;
                continue;
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Number of memories a user currently holds
    pub fn count(&self, user_id: &str) -> usize {
        match self.existing_slot(user_id) {
            Some(slot) => {
                let mut index = slot.lock();
                self.reconcile(user_id, &mut index);
                index.len()
            }
            None => 0,
        }
    }

    /// Statistics snapshot, optionally including one user's slice
    pub fn stats(&self, user_id: Option<&str>) -> Stats {
        self.stats.snapshot(self.cache.stats(), user_id)
    }

    /// Remove expired records in bounded batches, yielding between batches
    pub async fn sweep_expired(&self) -> usize {
        let batch = self.config.sweep_batch_size;
        let mut total = 0;
        loop {
            let removed = self.cache.sweep_expired(batch);
            total += removed;
            if removed < batch {
                break;
            }
            tokio::task::yield_now().await;
        }
        self.reconcile_all();
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::{FnScorer, TfIdfScorer};
    use crate::store::JsonDirPersistence;
    use crate::types::MemoryType;

    fn store_with(config: MnemosConfig) -> MemoryStore {
        MemoryStore::new(config, Arc::new(TfIdfScorer::default())).unwrap()
    }

    fn store() -> MemoryStore {
        store_with(MnemosConfig::default())
    }

    #[test]
    fn test_add_get_roundtrip() {
        let store = store();
        let added = store
            .add(
                "alice",
                NewMemory::new("Prefers dark roast coffee")
                    .with_type(MemoryType::Preference)
                    .with_tags(["coffee", "coffee", "morning"]),
            )
            .unwrap();
        assert_eq!(added.tags, vec!["coffee", "morning"]);
        assert_eq!(added.access_count, 0);

        let fetched = store.get("alice", &added.id.to_string()).unwrap();
        assert_eq!(fetched.content, "Prefers dark roast coffee");
        assert_eq!(fetched.memory_type, MemoryType::Preference);
        assert_eq!(fetched.access_count, 1);
        assert!(fetched.last_accessed_at.is_some());

        let again = store.get("alice", &added.id.to_string()).unwrap();
        assert_eq!(again.access_count, 2);
    }

    #[test]
    fn test_users_are_isolated() {
        let store = store();
        let added = store.add("alice", NewMemory::new("alice secret")).unwrap();
        let id = added.id.to_string();

        assert!(matches!(store.get("bob", &id), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.update("bob", &id, MemoryUpdate { content: Some("x".into()), ..Default::default() }),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.delete("bob", &id), Err(StoreError::NotFound(_))));
        assert!(store.list("bob", ListOptions::default()).unwrap().is_empty());
        assert_eq!(store.count("alice"), 1);
    }

    #[test]
    fn test_quota_evicts_least_recently_accessed() {
        let store = store_with(MnemosConfig {
            max_memories_per_user: 3,
            ..Default::default()
        });
        let a = store.add("u", NewMemory::new("memory a")).unwrap();
        let b = store.add("u", NewMemory::new("memory b")).unwrap();
        let c = store.add("u", NewMemory::new("memory c")).unwrap();
        store.get("u", &a.id.to_string()).unwrap();

        let d = store.add("u", NewMemory::new("memory d")).unwrap();
        assert_eq!(store.count("u"), 3);
        assert!(matches!(
            store.get("u", &b.id.to_string()),
            Err(StoreError::NotFound(_))
        ));
        for kept in [&a, &c, &d] {
            store.get("u", &kept.id.to_string()).unwrap();
        }

        let stats = store.stats(Some("u"));
        assert_eq!(stats.quota_eviction_count, 1);
        assert_eq!(stats.total_memories, 3);
        assert_eq!(stats.user.unwrap().quota_evictions, 1);
    }

    #[test]
    fn test_zero_quota_rejects() {
        let store = store_with(MnemosConfig {
            max_memories_per_user: 0,
            ..Default::default()
        });
        let err = store.add("u", NewMemory::new("anything")).unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded(_)));
        assert_eq!(store.stats(None).quota_rejection_count, 1);
    }

    #[test]
    fn test_invalid_content_leaves_store_unchanged() {
        let store = store_with(MnemosConfig {
            max_memory_size_bytes: 16,
            ..Default::default()
        });
        store.add("u", NewMemory::new("fits")).unwrap();

        let too_long = store.add("u", NewMemory::new("x".repeat(17)));
        assert!(matches!(too_long, Err(StoreError::InvalidContent(_))));
        let empty = store.add("u", NewMemory::new(""));
        assert!(matches!(empty, Err(StoreError::InvalidContent(_))));
        let tags = store.add("u", NewMemory::new("ok").with_tags((0..11).map(|i| format!("t{}", i))));
        assert!(matches!(tags, Err(StoreError::InvalidContent(_))));

        assert_eq!(store.count("u"), 1);
    }

    #[test]
    fn test_delete_twice_reports_not_found() {
        let store = store();
        let added = store.add("u", NewMemory::new("to delete")).unwrap();
        let id = added.id.to_string();

        store.delete("u", &id).unwrap();
        assert!(matches!(store.delete("u", &id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.get("u", &id), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete("u", "not-a-uuid"), Err(StoreError::NotFound(_))));
        assert_eq!(store.stats(None).total_memories, 0);
    }

    #[test]
    fn test_update_replaces_fields() {
        let store = store();
        let added = store
            .add("u", NewMemory::new("likes tea").with_tags(["drinks"]))
            .unwrap();
        let id = added.id.to_string();

        let updated = store
            .update(
                "u",
                &id,
                MemoryUpdate {
                    content: Some("likes green tea".into()),
                    tags: Some(vec!["drinks".into(), "tea".into()]),
                    metadata: None,
                },
            )
            .unwrap();
        assert_eq!(updated.content, "likes green tea");
        assert_eq!(updated.tags, vec!["drinks", "tea"]);
        assert_eq!(updated.created_at, added.created_at);
        assert!(updated.updated_at >= added.updated_at);
        assert_eq!(updated.access_count, 0);

        let empty = store.update("u", &id, MemoryUpdate::default());
        assert!(matches!(empty, Err(StoreError::InvalidContent(_))));
        assert_eq!(store.get("u", &id).unwrap().content, "likes green tea");
    }

    #[test]
    fn test_list_by_type_newest_first() {
        let store = store();
        let p1 = store
            .add("u", NewMemory::new("pref one").with_type(MemoryType::Preference))
            .unwrap();
        store.add("u", NewMemory::new("a fact")).unwrap();
        let p2 = store
            .add("u", NewMemory::new("pref two").with_type(MemoryType::Preference))
            .unwrap();

        let listed = store
            .list(
                "u",
                ListOptions {
                    memory_type: Some(MemoryType::Preference),
                    ..Default::default()
                },
            )
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![p2.id, p1.id]);
        assert!(listed.iter().all(|m| m.access_count == 0));

        let paged = store
            .list(
                "u",
                ListOptions {
                    limit: 1,
                    offset: 1,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].content, "a fact");
    }

    #[tokio::test]
    async fn test_search_ranks_and_records_access() {
        let store = store();
        store
            .add("u", NewMemory::new("coffee preferences: oat milk, no sugar"))
            .unwrap();
        store
            .add("u", NewMemory::new("the garage door code changed in spring"))
            .unwrap();

        let hits = store
            .search("u", "coffee with oat milk", SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].memory.content.starts_with("coffee"));
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|h| h.memory.access_count == 1));
        assert!(hits[0].memory.relevance_cache.is_some());
    }

    #[tokio::test]
    async fn test_search_filters() {
        let store = store();
        store
            .add("u", NewMemory::new("tea in the afternoon").with_tags(["drinks"]))
            .unwrap();
        store
            .add(
                "u",
                NewMemory::new("tea with lemon")
                    .with_type(MemoryType::Preference)
                    .with_tags(["drinks", "citrus"]),
            )
            .unwrap();

        let tagged = store
            .search(
                "u",
                "tea",
                SearchOptions {
                    tags: vec!["citrus".into()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(tagged.len(), 1);

        let typed = store
            .search(
                "u",
                "tea",
                SearchOptions {
                    memory_type: Some(MemoryType::Fact),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].memory.content, "tea in the afternoon");

        let strict = store
            .search(
                "u",
                "tea",
                SearchOptions {
                    min_relevance: 0.99,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(strict.is_empty());

        assert!(store
            .search("nobody", "tea", SearchOptions::default())
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(
            store.search("u", "  ", SearchOptions::default()).await,
            Err(StoreError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_search_degrades_when_scorer_fails() {
        let scorer = FnScorer::new(|_: &str, _: &str| -> Result<f64> {
            Err(StoreError::ScoringUnavailable("model offline".into()))
        });
        let store = MemoryStore::new(MnemosConfig::default(), Arc::new(scorer)).unwrap();
        store.add("u", NewMemory::new("one")).unwrap();
        store.add("u", NewMemory::new("two")).unwrap();

        let hits = store
            .search("u", "anything", SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score <= 0.3 + 1e-9));
        assert!(hits.iter().all(|h| h.memory.relevance_cache.is_none()));
        assert_eq!(store.stats(None).scoring_degraded_count, 2);
    }

    #[test]
    fn test_concurrent_adds_respect_quota() {
        let store = Arc::new(store_with(MnemosConfig {
            max_memories_per_user: 5,
            ..Default::default()
        }));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store
                            .add("shared", NewMemory::new(format!("thread {} item {}", t, i)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.count("shared"), 5);
        let stats = store.stats(Some("shared"));
        assert_eq!(stats.total_memories, 5);
        assert_eq!(stats.quota_eviction_count, 75);
    }

    #[test]
    fn test_cache_capacity_evictions_are_reconciled() {
        let store = store_with(MnemosConfig {
            cache_capacity_entries: 4,
            ..Default::default()
        });
        for i in 0..6 {
            store.add("u", NewMemory::new(format!("memory {}", i))).unwrap();
        }

        let count = store.count("u");
        assert!(count < 6);
        let stats = store.stats(Some("u"));
        assert_eq!(stats.total_memories, count as i64);
        assert_eq!(stats.user.unwrap().cache_evictions, (6 - count) as u64);
        assert_eq!(store.list("u", ListOptions::default()).unwrap().len(), count);
    }

    #[test]
    fn test_rehydrates_from_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = Arc::new(TfIdfScorer::default());
        let kept = {
            let hook = Arc::new(JsonDirPersistence::open(dir.path()).unwrap());
            let store =
                MemoryStore::with_persistence(MnemosConfig::default(), scorer.clone(), hook).unwrap();
            let kept = store.add("u", NewMemory::new("survives restart")).unwrap();
            let gone = store.add("u", NewMemory::new("deleted before restart")).unwrap();
            store.delete("u", &gone.id.to_string()).unwrap();
            kept
        };

        let hook = Arc::new(JsonDirPersistence::open(dir.path()).unwrap());
        let store = MemoryStore::with_persistence(MnemosConfig::default(), scorer, hook).unwrap();
        assert_eq!(store.count("u"), 1);
        let restored = store.get("u", &kept.id.to_string()).unwrap();
        assert_eq!(restored.content, "survives restart");
        assert_eq!(store.stats(None).total_memories, 1);
    }

    #[test]
    fn test_rehydration_respects_lowered_quota() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = Arc::new(TfIdfScorer::default());
        let (first, second, third) = {
            let hook = Arc::new(JsonDirPersistence::open(dir.path()).unwrap());
            let store =
                MemoryStore::with_persistence(MnemosConfig::default(), scorer.clone(), hook).unwrap();
            let first = store.add("u", NewMemory::new("first")).unwrap();
            let second = store.add("u", NewMemory::new("second")).unwrap();
            let third = store.add("u", NewMemory::new("third")).unwrap();
            store.get("u", &first.id.to_string()).unwrap();
            (first, second, third)
        };

        let lowered = MnemosConfig {
            max_memories_per_user: 2,
            ..Default::default()
        };
        let hook = Arc::new(JsonDirPersistence::open(dir.path()).unwrap());
        let store = MemoryStore::with_persistence(lowered, scorer, hook.clone()).unwrap();
        assert_eq!(store.count("u"), 2);
        assert!(matches!(
            store.get("u", &second.id.to_string()),
            Err(StoreError::NotFound(_))
        ));
        store.get("u", &first.id.to_string()).unwrap();
        store.get("u", &third.id.to_string()).unwrap();

        let stats = store.stats(Some("u"));
        assert_eq!(stats.quota_eviction_count, 1);
        assert_eq!(stats.total_memories, 2);
        assert_eq!(hook.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_unbounded_ttl_rejected_at_construction() {
        let config = MnemosConfig {
            memory_ttl_seconds: u64::MAX,
            ..Default::default()
        };
        let result = MemoryStore::new(config, Arc::new(TfIdfScorer::default()));
        assert!(matches!(result, Err(StoreError::Config(_))));
    }

    #[test]
    fn test_whitespace_content_round_trips() {
        let store = store_with(MnemosConfig {
            max_memory_size_bytes: 1,
            ..Default::default()
        });
        let added = store.add("u", NewMemory::new(" ")).unwrap();
        let fetched = store.get("u", &added.id.to_string()).unwrap();
        assert_eq!(fetched.content, " ");
    }

    #[test]
    fn test_memory_key_roundtrip() {
        let id = Uuid::new_v4();
        let key = memory_key("team:alice", &id);
        assert_eq!(parse_memory_key(&key), Some(("team:alice", id)));
        assert_eq!(parse_memory_key("index:alice"), None);
        assert_eq!(parse_memory_key("memory:alice:not-a-uuid"), None);
    }
}
