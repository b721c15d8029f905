//! Per-user index of owned memories

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::types::{ListOptions, MemoryEntry, MemoryId, MemoryType, SortBy, SortOrder};

/// Summary of one indexed memory
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub memory_type: MemoryType,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Store-wide insertion order, the last tie-breaker
    pub seq: u64,
}

impl IndexEntry {
    fn accessed_or_created(&self) -> DateTime<Utc> {
        self.last_accessed_at.unwrap_or(self.created_at)
    }
}

/// Ids owned by one user with enough metadata to order and evict them
#[derive(Debug, Default)]
pub struct UserIndex {
    entries: HashMap<MemoryId, IndexEntry>,
}

impl UserIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &MemoryId) -> bool {
        self.entries.contains_key(id)
    }

    pub(crate) fn insert(&mut self, entry: &MemoryEntry, seq: u64) {
        self.entries.insert(
            entry.id,
            IndexEntry {
                memory_type: entry.memory_type,
                created_at: entry.created_at,
                last_accessed_at: entry.last_accessed_at,
                seq,
            },
        );
    }

    pub(crate) fn remove(&mut self, id: &MemoryId) -> Option<IndexEntry> {
        self.entries.remove(id)
    }

    pub(crate) fn touch(&mut self, id: &MemoryId, at: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.last_accessed_at = Some(at);
        }
    }

    /// Quota eviction victim
    ///
    /// Least recently accessed first; never-accessed memories count from
    /// their creation time. Ties go to the older `created_at`, then to
    /// insertion order.
    pub(crate) fn least_recently_accessed(&self, exclude: Option<&MemoryId>) -> Option<MemoryId> {
        self.entries
            .iter()
            .filter(|(id, _)| Some(*id) != exclude)
            .min_by(|(_, a), (_, b)| {
                a.accessed_or_created()
                    .cmp(&b.accessed_or_created())
                    .then_with(|| a.created_at.cmp(&b.created_at))
                    .then_with(|| a.seq.cmp(&b.seq))
            })
            .map(|(id, _)| *id)
    }

    /// Ids matching `memory_type`, in insertion order
    pub(crate) fn ids(&self, memory_type: Option<MemoryType>) -> Vec<MemoryId> {
        let mut matching: Vec<(&MemoryId, &IndexEntry)> = self
            .entries
            .iter()
            .filter(|(_, e)| memory_type.map_or(true, |t| e.memory_type == t))
            .collect();
        matching.sort_by_key(|(_, e)| e.seq);
        matching.into_iter().map(|(id, _)| *id).collect()
    }

    /// Ids ordered for `list`
    pub(crate) fn ordered(&self, options: &ListOptions) -> Vec<MemoryId> {
        let mut matching: Vec<(&MemoryId, &IndexEntry)> = self
            .entries
            .iter()
            .filter(|(_, e)| options.memory_type.map_or(true, |t| e.memory_type == t))
            .collect();

        matching.sort_by(|(_, a), (_, b)| {
            let ord = match options.sort_by {
                SortBy::Created => a.created_at.cmp(&b.created_at),
                SortBy::Accessed => a
                    .accessed_or_created()
                    .cmp(&b.accessed_or_created())
                    .then_with(|| a.created_at.cmp(&b.created_at)),
            }
            .then_with(|| a.seq.cmp(&b.seq));
            match options.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });

        matching.into_iter().map(|(id, _)| *id).collect()
    }

    /// Ids in insertion order, the persisted form of the index
    pub(crate) fn persisted_ids(&self) -> Vec<MemoryId> {
        self.ids(None)
    }
}
