//! Relevance ranking for memory search
//!
//! Implements:
//! - Composite scoring (semantic + recency + frequency)
//! - Timeout-bounded calls into an injected semantic scorer
//! - Graceful degradation when the scorer fails or times out
//! - A local TF-IDF scorer for deployments without a language model

mod engine;
mod scorer;
mod tfidf;

pub use engine::{query_signature, RankedCandidate, RankingConfig, RankingEngine, ScoreComponents};
pub use scorer::{FnScorer, SemanticScorer};
pub use tfidf::TfIdfScorer;
