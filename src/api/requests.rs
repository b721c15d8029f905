//! Request and response shapes for the API façade

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{MemoryEntry, MemoryId, MemoryType, ScoredMemory, SortBy, SortOrder};

fn default_list_limit() -> usize {
    20
}

/// Input for `add_memory`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemoryRequest {
    pub user_id: String,
    pub content: String,
    #[serde(default, rename = "type")]
    pub memory_type: MemoryType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Result of `add_memory`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddMemoryResponse {
    pub id: MemoryId,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub created_at: DateTime<Utc>,
    pub byte_count: usize,
    pub token_count: usize,
}

/// Input for `search_memories`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMemoriesRequest {
    pub user_id: String,
    pub query: String,
    #[serde(default, rename = "type")]
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_relevance: f64,
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: MemoryId,
    pub content: String,
    pub score: f64,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ScoredMemory> for SearchHit {
    fn from(hit: ScoredMemory) -> Self {
        Self {
            id: hit.memory.id,
            content: hit.memory.content,
            score: hit.score,
            memory_type: hit.memory.memory_type,
            tags: hit.memory.tags,
            created_at: hit.memory.created_at,
        }
    }
}

/// Input for `get_memory`, `delete_memory`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRef {
    pub user_id: String,
    #[serde(alias = "id")]
    pub memory_id: String,
}

/// Input for `get_memories`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMemoriesRequest {
    pub user_id: String,
    #[serde(default, rename = "type")]
    pub memory_type: Option<MemoryType>,
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub order: SortOrder,
}

/// Input for `update_memory`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMemoryRequest {
    pub user_id: String,
    #[serde(alias = "id")]
    pub memory_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Result of `delete_memory`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMemoryResponse {
    pub deleted: bool,
    pub memory_id: String,
}

/// Input for `get_memory_stats`; omit `user_id` for process-wide numbers only
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// A memory as returned to callers
///
/// Leaves out the internal relevance cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryView {
    pub id: MemoryId,
    pub content: String,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub access_count: u64,
}

impl From<MemoryEntry> for MemoryView {
    fn from(entry: MemoryEntry) -> Self {
        Self {
            id: entry.id,
            content: entry.content,
            memory_type: entry.memory_type,
            tags: entry.tags,
            metadata: entry.metadata,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
            last_accessed_at: entry.last_accessed_at,
            access_count: entry.access_count,
        }
    }
}
