//! TF-IDF based semantic scorer
//!
//! Simple, fast, no external dependencies. Good for testing and
//! environments where a language model isn't available.

use async_trait::async_trait;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use super::SemanticScorer;
use crate::error::Result;

/// Cosine similarity of hashed TF-IDF vectors
pub struct TfIdfScorer {
    dimensions: usize,
}

impl TfIdfScorer {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Tokenize text into lowercase words
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() > 1)
            .map(String::from)
            .collect()
    }

    fn hash_token(token: &str, dimensions: usize) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % dimensions
    }

    /// Build an L2-normalized vector for `text`
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        let mut vector = vec![0.0_f32; self.dimensions];
        if tokens.is_empty() {
            return vector;
        }

        let mut tf: HashMap<&str, f32> = HashMap::new();
        for token in &tokens {
            *tf.entry(token.as_str()).or_insert(0.0) += 1.0;
        }

        let doc_len = tokens.len() as f32;
        for (token, count) in tf {
            let tf_score = (1.0 + count / doc_len).ln();
            // Longer tokens are treated as rarer
            let idf_score = 1.0 + (token.len() as f32 * 0.1);
            vector[Self::hash_token(token, self.dimensions)] += tf_score * idf_score;
        }

        for window in tokens.windows(2) {
            let bigram = format!("{}_{}", window[0], window[1]);
            vector[Self::hash_token(&bigram, self.dimensions)] += 0.5 / doc_len;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }

    fn cosine(a: &[f32], b: &[f32]) -> f64 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        dot as f64
    }
}

impl Default for TfIdfScorer {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl SemanticScorer for TfIdfScorer {
    async fn score(&self, query: &str, content: &str) -> Result<f64> {
        let q = self.vectorize(query);
        let c = self.vectorize(content);
        Ok(Self::cosine(&q, &c).clamp(0.0, 1.0))
    }

    fn name(&self) -> &str {
        "tfidf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identical_text_scores_high() {
        let scorer = TfIdfScorer::default();
        let s = scorer
            .score("prefers dark roast coffee", "prefers dark roast coffee")
            .await
            .unwrap();
        assert!(s > 0.99, "got {}", s);
    }

    #[tokio::test]
    async fn test_related_beats_unrelated() {
        let scorer = TfIdfScorer::default();
        let related = scorer
            .score("coffee preferences", "coffee preferences: oat milk, no sugar")
            .await
            .unwrap();
        let unrelated = scorer
            .score("coffee preferences", "Deploys happen on Tuesdays")
            .await
            .unwrap();
        assert!(related > unrelated);
        assert!((0.0..=1.0).contains(&unrelated));
    }

    #[tokio::test]
    async fn test_empty_text_scores_zero() {
        let scorer = TfIdfScorer::default();
        assert_eq!(scorer.score("", "anything here").await.unwrap(), 0.0);
    }
}
