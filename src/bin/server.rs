//! Mnemos server
//!
//! Reads one JSON tool call per line on stdin and writes one JSON reply per
//! line on stdout:
//!
//! ```text
//! {"id": 1, "tool": "add_memory", "params": {"user_id": "u1", "content": "..."}}
//! {"id": 1, "result": {"id": "...", "type": "fact", ...}}
//! ```
//!
//! `{"tool": "list_tools"}` returns the tool definitions.
//!
//! Run with: mnemos-server

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mnemos::api::{get_tool_definitions, MemoryApi};
use mnemos::config::{MnemosConfig, RankingWeights};
use mnemos::ranking::TfIdfScorer;
use mnemos::store::{ExpirySweeper, JsonDirPersistence, MemoryStore};

#[derive(Parser, Debug)]
#[command(name = "mnemos-server")]
#[command(about = "Cache-backed semantic memory store")]
struct Args {
    /// Maximum memories held per user
    #[arg(long, env = "MNEMOS_MAX_MEMORIES_PER_USER", default_value = "1000")]
    max_memories_per_user: usize,

    /// Maximum content size in bytes
    #[arg(long, env = "MNEMOS_MAX_MEMORY_SIZE_BYTES", default_value = "10240")]
    max_memory_size_bytes: usize,

    /// Memory time-to-live in seconds, renewed on every read
    #[arg(long, env = "MNEMOS_MEMORY_TTL_SECONDS", default_value = "7776000")]
    memory_ttl_seconds: u64,

    /// Default number of search results
    #[arg(long, env = "MNEMOS_SEARCH_RESULT_LIMIT", default_value = "10")]
    search_result_limit: usize,

    /// Cache capacity in records
    #[arg(long, env = "MNEMOS_CACHE_CAPACITY_ENTRIES", default_value = "100000")]
    cache_capacity_entries: usize,

    /// Cache capacity in bytes
    #[arg(long, env = "MNEMOS_CACHE_CAPACITY_BYTES", default_value = "268435456")]
    cache_capacity_bytes: usize,

    /// Largest single cache record in bytes
    #[arg(long, env = "MNEMOS_CACHE_MAX_RECORD_BYTES", default_value = "65536")]
    cache_max_record_bytes: usize,

    /// Timeout for one semantic scoring call in ms
    #[arg(long, env = "MNEMOS_SEMANTIC_SCORE_TIMEOUT_MS", default_value = "200")]
    semantic_score_timeout_ms: u64,

    /// Ranking weights as semantic,recency,frequency
    #[arg(long, env = "MNEMOS_RANKING_WEIGHTS", default_value = "0.7,0.2,0.1")]
    ranking_weights: RankingWeights,

    /// Recency half-life in seconds
    #[arg(long, env = "MNEMOS_RECENCY_HALF_LIFE_SECS", default_value = "604800")]
    recency_half_life_secs: u64,

    /// Access count at which the frequency term saturates
    #[arg(long, env = "MNEMOS_FREQUENCY_CAP", default_value = "50")]
    frequency_cap: u64,

    /// Scorer calls in flight per search
    #[arg(long, env = "MNEMOS_SCORING_CONCURRENCY", default_value = "8")]
    scoring_concurrency: usize,

    /// Expiry sweep interval in seconds (0 = disabled)
    #[arg(long, env = "MNEMOS_SWEEP_INTERVAL_SECS", default_value = "60")]
    sweep_interval_secs: u64,

    /// Expired records removed per sweep batch
    #[arg(long, env = "MNEMOS_SWEEP_BATCH_SIZE", default_value = "256")]
    sweep_batch_size: usize,

    /// Directory for write-through persistence (in-memory only when unset)
    #[arg(long, env = "MNEMOS_PERSIST_DIR")]
    persist_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, env = "MNEMOS_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn config(&self) -> MnemosConfig {
        MnemosConfig {
            max_memories_per_user: self.max_memories_per_user,
            max_memory_size_bytes: self.max_memory_size_bytes,
            memory_ttl_seconds: self.memory_ttl_seconds,
            search_result_limit: self.search_result_limit,
            cache_capacity_entries: self.cache_capacity_entries,
            cache_capacity_bytes: self.cache_capacity_bytes,
            cache_max_record_bytes: self.cache_max_record_bytes,
            semantic_score_timeout_ms: self.semantic_score_timeout_ms,
            ranking_weights: self.ranking_weights,
            recency_half_life_secs: self.recency_half_life_secs,
            frequency_cap: self.frequency_cap,
            scoring_concurrency: self.scoring_concurrency,
            sweep_interval_secs: self.sweep_interval_secs,
            sweep_batch_size: self.sweep_batch_size,
        }
    }
}

/// One line of input
#[derive(Debug, Deserialize)]
struct ToolRequest {
    #[serde(default)]
    id: Option<Value>,
    tool: String,
    #[serde(default)]
    params: Value,
}

fn init_logging(json: bool) {
    // stdout carries replies; logs go to stderr
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    if json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .with(filter)
            .init();
    }
}

async fn handle_line(api: &MemoryApi, line: &str) -> Value {
    let request: ToolRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            return json!({
                "id": Value::Null,
                "error": {"code": -32700, "kind": "parse_error", "message": e.to_string()}
            })
        }
    };

    let result = if request.tool == "list_tools" {
        json!(get_tool_definitions())
    } else {
        api.handle_tool_call(&request.tool, request.params).await
    };

    match result.get("error") {
        Some(error) => json!({"id": request.id, "error": error}),
        None => json!({"id": request.id, "result": result}),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let config = args.config();
    config.validate().context("invalid configuration")?;
    let scorer = Arc::new(TfIdfScorer::default());

    let store = match &args.persist_dir {
        Some(dir) => {
            let hook = Arc::new(
                JsonDirPersistence::open(dir)
                    .with_context(|| format!("opening persistence dir {}", dir.display()))?,
            );
            MemoryStore::with_persistence(config, scorer, hook)?
        }
        None => MemoryStore::new(config, scorer)?,
    };
    let store = Arc::new(store);
    let sweeper = ExpirySweeper::start(store.clone());
    let api = MemoryApi::new(store);

    tracing::info!(version = mnemos::VERSION, "mnemos server ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = handle_line(&api, &line).await;
                let mut out = serde_json::to_vec(&reply)?;
                out.push(b'\n');
                stdout.write_all(&out).await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await?;
    }
    tracing::info!("mnemos server stopped");
    Ok(())
}
