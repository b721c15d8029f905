//! Tool definitions for the JSON dispatcher

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A tool advertised to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// (name, description, JSON schema) for every tool
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    (
        "add_memory",
        "Store a new memory for a user. The user's least recently accessed memory is evicted when the quota is full.",
        r#"{
            "type": "object",
            "properties": {
                "user_id": {"type": "string"},
                "content": {"type": "string", "description": "The content to remember"},
                "type": {"type": "string", "enum": ["preference", "fact", "context", "behavior", "instruction"], "default": "fact"},
                "tags": {"type": "array", "items": {"type": "string"}, "maxItems": 10},
                "metadata": {"type": "object", "description": "Additional metadata as key-value pairs"}
            },
            "required": ["user_id", "content"]
        }"#,
    ),
    (
        "search_memories",
        "Rank a user's memories by semantic relevance, recency and access frequency",
        r#"{
            "type": "object",
            "properties": {
                "user_id": {"type": "string"},
                "query": {"type": "string"},
                "type": {"type": "string", "enum": ["preference", "fact", "context", "behavior", "instruction"]},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Every tag must be present"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 50},
                "min_relevance": {"type": "number", "minimum": 0, "maximum": 1, "default": 0}
            },
            "required": ["user_id", "query"]
        }"#,
    ),
    (
        "get_memory",
        "Retrieve one memory by id",
        r#"{
            "type": "object",
            "properties": {
                "user_id": {"type": "string"},
                "memory_id": {"type": "string"}
            },
            "required": ["user_id", "memory_id"]
        }"#,
    ),
    (
        "get_memories",
        "List a user's memories with type filter and pagination",
        r#"{
            "type": "object",
            "properties": {
                "user_id": {"type": "string"},
                "type": {"type": "string", "enum": ["preference", "fact", "context", "behavior", "instruction"]},
                "limit": {"type": "integer", "default": 20},
                "offset": {"type": "integer", "default": 0},
                "sort_by": {"type": "string", "enum": ["created", "accessed"], "default": "created"},
                "order": {"type": "string", "enum": ["asc", "desc"], "default": "desc"}
            },
            "required": ["user_id"]
        }"#,
    ),
    (
        "update_memory",
        "Replace the content, tags or metadata of a memory",
        r#"{
            "type": "object",
            "properties": {
                "user_id": {"type": "string"},
                "memory_id": {"type": "string"},
                "content": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "metadata": {"type": "object"}
            },
            "required": ["user_id", "memory_id"]
        }"#,
    ),
    (
        "delete_memory",
        "Delete a memory",
        r#"{
            "type": "object",
            "properties": {
                "user_id": {"type": "string"},
                "memory_id": {"type": "string"}
            },
            "required": ["user_id", "memory_id"]
        }"#,
    ),
    (
        "get_memory_stats",
        "Memory counts by type, cache hit rate, latency and eviction counters",
        r#"{
            "type": "object",
            "properties": {
                "user_id": {"type": "string", "description": "Include this user's slice of the statistics"}
            }
        }"#,
    ),
];

/// Tool names in definition order
pub fn tool_names() -> Vec<&'static str> {
    TOOL_DEFINITIONS.iter().map(|(name, _, _)| *name).collect()
}

/// Parsed tool definitions
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).unwrap_or(json!({})),
        })
        .collect()
}
