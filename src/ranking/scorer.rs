//! Semantic scorer capability

use async_trait::async_trait;

use crate::error::Result;

/// Scores how well `content` answers `query`
///
/// Implementations usually call out to a language model. The ranking engine
/// bounds every call with a timeout and clamps the result to `[0, 1]`, so
/// implementations need not do either.
#[async_trait]
pub trait SemanticScorer: Send + Sync {
    async fn score(&self, query: &str, content: &str) -> Result<f64>;

    /// Scorer name for logs
    fn name(&self) -> &str {
        "custom"
    }
}

/// Adapts a synchronous closure into a scorer
pub struct FnScorer<F> {
    f: F,
}

impl<F> FnScorer<F>
where
    F: Fn(&str, &str) -> Result<f64> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> SemanticScorer for FnScorer<F>
where
    F: Fn(&str, &str) -> Result<f64> + Send + Sync,
{
    async fn score(&self, query: &str, content: &str) -> Result<f64> {
        (self.f)(query, content)
    }

    fn name(&self) -> &str {
        "fn"
    }
}
