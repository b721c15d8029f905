//! API façade over the memory store
//!
//! Typed async methods for each operation, plus a JSON tool dispatcher
//! (`handle_tool_call`) for callers that speak JSON. Dispatcher errors are
//! objects carrying a numeric code, a kind and a message.

mod requests;
mod tools;

pub use requests::{
    AddMemoryRequest, AddMemoryResponse, DeleteMemoryResponse, ListMemoriesRequest, MemoryRef,
    MemoryView, SearchHit, SearchMemoriesRequest, StatsRequest, UpdateMemoryRequest,
};
pub use tools::{get_tool_definitions, tool_names, ToolDefinition, TOOL_DEFINITIONS};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::stats::Stats;
use crate::store::MemoryStore;
use crate::types::{ListOptions, MemoryUpdate, NewMemory, SearchOptions};

static TOKENIZER: Lazy<Option<Mutex<tiktoken_rs::CoreBPE>>> = Lazy::new(|| match tiktoken_rs::cl100k_base() {
    Ok(bpe) => Some(Mutex::new(bpe)),
    Err(e) => {
        tracing::warn!("tokenizer unavailable, estimating token counts: {}", e);
        None
    }
});

/// cl100k token count, or a four-bytes-per-token estimate without a tokenizer
pub fn count_tokens(text: &str) -> usize {
    match TOKENIZER.as_ref() {
        Some(bpe) => bpe.lock().encode_with_special_tokens(text).len(),
        None => text.len().div_ceil(4),
    }
}

/// External operation set
#[derive(Clone)]
pub struct MemoryApi {
    store: Arc<MemoryStore>,
}

impl MemoryApi {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub async fn add_memory(&self, req: AddMemoryRequest) -> Result<AddMemoryResponse> {
        let byte_count = req.content.len();
        let input = NewMemory {
            content: req.content,
            memory_type: req.memory_type,
            tags: req.tags,
            metadata: req.metadata,
        };
        let entry = self.store.add(&req.user_id, input)?;
        Ok(AddMemoryResponse {
            id: entry.id,
            memory_type: entry.memory_type,
            created_at: entry.created_at,
            byte_count,
            token_count: count_tokens(&entry.content),
        })
    }

    pub async fn search_memories(&self, req: SearchMemoriesRequest) -> Result<Vec<SearchHit>> {
        let options = SearchOptions {
            memory_type: req.memory_type,
            tags: req.tags,
            limit: req.limit,
            min_relevance: req.min_relevance,
        };
        let hits = self.store.search(&req.user_id, &req.query, options).await?;
        Ok(hits.into_iter().map(SearchHit::from).collect())
    }

    pub async fn get_memory(&self, req: MemoryRef) -> Result<MemoryView> {
        self.store
            .get(&req.user_id, &req.memory_id)
            .map(MemoryView::from)
    }

    pub async fn get_memories(&self, req: ListMemoriesRequest) -> Result<Vec<MemoryView>> {
        let options = ListOptions {
            memory_type: req.memory_type,
            limit: req.limit,
            offset: req.offset,
            sort_by: req.sort_by,
            order: req.order,
        };
        let entries = self.store.list(&req.user_id, options)?;
        Ok(entries.into_iter().map(MemoryView::from).collect())
    }

    pub async fn update_memory(&self, req: UpdateMemoryRequest) -> Result<MemoryView> {
        let update = MemoryUpdate {
            content: req.content,
            tags: req.tags,
            metadata: req.metadata,
        };
        self.store
            .update(&req.user_id, &req.memory_id, update)
            .map(MemoryView::from)
    }

    pub async fn delete_memory(&self, req: MemoryRef) -> Result<DeleteMemoryResponse> {
        self.store.delete(&req.user_id, &req.memory_id)?;
        Ok(DeleteMemoryResponse {
            deleted: true,
            memory_id: req.memory_id,
        })
    }

    pub async fn get_memory_stats(&self, req: StatsRequest) -> Result<Stats> {
        Ok(self.store.stats(req.user_id.as_deref()))
    }

    /// Dispatch a tool call by name
    pub async fn handle_tool_call(&self, name: &str, params: Value) -> Value {
        let result = match name {
            "add_memory" => match parse(params) {
                Ok(req) => to_value(self.add_memory(req).await),
                Err(e) => e,
            },
            "search_memories" => match parse(params) {
                Ok(req) => to_value(self.search_memories(req).await),
                Err(e) => e,
            },
            "get_memory" => match parse(params) {
                Ok(req) => to_value(self.get_memory(req).await),
                Err(e) => e,
            },
            "get_memories" => match parse(params) {
                Ok(req) => to_value(self.get_memories(req).await),
                Err(e) => e,
            },
            "update_memory" => match parse(params) {
                Ok(req) => to_value(self.update_memory(req).await),
                Err(e) => e,
            },
            "delete_memory" => match parse(params) {
                Ok(req) => to_value(self.delete_memory(req).await),
                Err(e) => e,
            },
            "get_memory_stats" => {
                // Stats takes no required params; accept null
                let params = if params.is_null() { json!({}) } else { params };
                match parse(params) {
                    Ok(req) => to_value(self.get_memory_stats(req).await),
                    Err(e) => e,
                }
            }
            _ => error_value(-32601, "unknown_tool", &format!("Unknown tool: {}", name)),
        };

        if result.get("error").is_some() {
            tracing::debug!(tool = name, "tool call failed: {}", result["error"]);
        }
        result
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> std::result::Result<T, Value> {
    serde_json::from_value(params)
        .map_err(|e| error_value(-32602, "invalid_params", &format!("Invalid params: {}", e)))
}

fn to_value<T: Serialize>(result: Result<T>) -> Value {
    match result.and_then(|v| serde_json::to_value(v).map_err(StoreError::from)) {
        Ok(value) => value,
        Err(e) => error_value(e.code(), e.kind(), &e.to_string()),
    }
}

fn error_value(code: i64, kind: &str, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "kind": kind,
            "message": message,
        }
    })
}
