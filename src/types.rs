//! Core types for Mnemos

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Unique identifier for a memory
pub type MemoryId = Uuid;

/// Maximum number of tags on a single memory
pub const MAX_TAGS: usize = 10;

/// Maximum tag length in bytes
pub const MAX_TAG_BYTES: usize = 32;

/// Default maximum content length in bytes
pub const DEFAULT_MAX_CONTENT_BYTES: usize = 10240;

/// A memory entry held in the cache tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier
    pub id: MemoryId,
    /// Owning principal
    pub user_id: String,
    /// Main content of the memory
    pub content: String,
    /// Memory type
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
    /// Arbitrary metadata as JSON
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last created or updated
    pub updated_at: DateTime<Utc>,
    /// When the memory was last read
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Number of reads that returned this memory
    #[serde(default)]
    pub access_count: u64,
    /// Semantic score remembered from the last search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_cache: Option<RelevanceCache>,
}

impl MemoryEntry {
    /// Timestamp recency is measured from
    pub fn recency_anchor(&self) -> DateTime<Utc> {
        self.last_accessed_at.unwrap_or(self.created_at)
    }

    /// Whether all of `required` are present in this memory's tags
    pub fn has_all_tags(&self, required: &[String]) -> bool {
        required.iter().all(|t| self.tags.contains(t))
    }

    /// Record a successful read
    pub(crate) fn mark_read(&mut self, at: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = Some(at);
    }
}

/// Last computed semantic score for one query signature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceCache {
    pub query_hash: u64,
    pub semantic: f64,
}

/// Memory type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Preference,
    #[default]
    Fact,
    Context,
    Behavior,
    Instruction,
}

impl MemoryType {
    pub const ALL: [MemoryType; 5] = [
        MemoryType::Preference,
        MemoryType::Fact,
        MemoryType::Context,
        MemoryType::Behavior,
        MemoryType::Instruction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Preference => "preference",
            MemoryType::Fact => "fact",
            MemoryType::Context => "context",
            MemoryType::Behavior => "behavior",
            MemoryType::Instruction => "instruction",
        }
    }

    /// Stable slot used by per-type counters
    pub(crate) fn index(&self) -> usize {
        match self {
            MemoryType::Preference => 0,
            MemoryType::Fact => 1,
            MemoryType::Context => 2,
            MemoryType::Behavior => 3,
            MemoryType::Instruction => 4,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "preference" => Ok(MemoryType::Preference),
            "fact" => Ok(MemoryType::Fact),
            "context" => Ok(MemoryType::Context),
            "behavior" => Ok(MemoryType::Behavior),
            "instruction" => Ok(MemoryType::Instruction),
            _ => Err(format!("Unknown memory type: {}", s)),
        }
    }
}

/// Field used to order `list` results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Created,
    Accessed,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Input for creating a memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMemory {
    pub content: String,
    #[serde(default, rename = "type")]
    pub memory_type: MemoryType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl NewMemory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = memory_type;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Fields replaced by an update; `None` leaves the field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl MemoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.tags.is_none() && self.metadata.is_none()
    }

    /// Names of the fields this update replaces
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.content.is_some() {
            fields.push("content");
        }
        if self.tags.is_some() {
            fields.push("tags");
        }
        if self.metadata.is_some() {
            fields.push("metadata");
        }
        fields
    }
}

/// Search parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    pub memory_type: Option<MemoryType>,
    /// Required tags (subset match)
    #[serde(default)]
    pub tags: Vec<String>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub min_relevance: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            memory_type: None,
            tags: Vec::new(),
            limit: None,
            min_relevance: 0.0,
        }
    }
}

/// Options for listing memories
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    pub memory_type: Option<MemoryType>,
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub order: SortOrder,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            memory_type: None,
            limit: 20,
            offset: 0,
            sort_by: SortBy::Created,
            order: SortOrder::Desc,
        }
    }
}

/// A ranked search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub memory: MemoryEntry,
    pub score: f64,
}

/// Validate memory content against the configured byte limit
pub fn validate_content(content: &str, max_bytes: usize) -> Result<()> {
    let len = content.len();
    if len == 0 {
        return Err(StoreError::InvalidContent(
            "content: must not be empty".to_string(),
        ));
    }
    if len > max_bytes {
        return Err(StoreError::InvalidContent(format!(
            "content: {} bytes exceeds the {} byte limit",
            len, max_bytes
        )));
    }
    Ok(())
}

/// Validate tags and collapse duplicates, keeping first occurrence
pub fn normalize_tags(tags: Vec<String>) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if tag.is_empty() {
            return Err(StoreError::InvalidContent(
                "tags: tag must not be empty".to_string(),
            ));
        }
        if tag.len() > MAX_TAG_BYTES {
            return Err(StoreError::InvalidContent(format!(
                "tags: tag of {} bytes exceeds the {} byte limit",
                tag.len(),
                MAX_TAG_BYTES
            )));
        }
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    if out.len() > MAX_TAGS {
        return Err(StoreError::InvalidContent(format!(
            "tags: {} tags exceeds the limit of {}",
            out.len(),
            MAX_TAGS
        )));
    }
    Ok(out)
}

/// Validate a caller-supplied user id
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(StoreError::InvalidContent(
            "user_id: must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_roundtrip() {
        for t in MemoryType::ALL {
            assert_eq!(t.as_str().parse::<MemoryType>().unwrap(), t);
        }
        assert!("note".parse::<MemoryType>().is_err());
        assert_eq!("PREFERENCE".parse::<MemoryType>().unwrap(), MemoryType::Preference);
    }

    #[test]
    fn test_validate_content_bounds() {
        assert!(validate_content("x", 10).is_ok());
        assert!(validate_content(&"x".repeat(10), 10).is_ok());
        assert!(validate_content("", 10).is_err());
        // Whitespace is content like any other byte
        assert!(validate_content(" ", 1).is_ok());
        assert!(validate_content("  ", 1).is_err());

        let err = validate_content(&"x".repeat(11), 10).unwrap_err();
        assert!(err.to_string().contains("content"));
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(vec!["a".into(), "b".into(), "a".into()]).unwrap();
        assert_eq!(tags, vec!["a".to_string(), "b".to_string()]);

        let too_many: Vec<String> = (0..11).map(|i| format!("t{}", i)).collect();
        assert!(normalize_tags(too_many).is_err());

        assert!(normalize_tags(vec!["x".repeat(33)]).is_err());
        assert!(normalize_tags(vec!["x".repeat(32)]).is_ok());
        assert!(normalize_tags(vec![String::new()]).is_err());
    }

    #[test]
    fn test_relevance_cache_not_serialized_when_absent() {
        let now = Utc::now();
        let entry = MemoryEntry {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            content: "likes tea".into(),
            memory_type: MemoryType::Preference,
            tags: vec![],
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            last_accessed_at: None,
            access_count: 0,
            relevance_cache: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("relevance_cache").is_none());
        assert_eq!(json["type"], "preference");
    }
}
