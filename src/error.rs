//! Error types for Mnemos

use thiserror::Error;

/// Result type alias for memory store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the cache tier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("record too large: {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
}

/// Main error type for the memory store and API façade
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Scoring unavailable: {0}")]
    ScoringUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CacheError> for StoreError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::TooLarge { size, max } => StoreError::InvalidContent(format!(
                "serialized memory is {} bytes, exceeding the {} byte record limit",
                size, max
            )),
        }
    }
}

impl StoreError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::ScoringUnavailable(_) | StoreError::Persistence(_) | StoreError::Io(_)
        )
    }

    /// Get error code for the JSON tool dispatcher
    pub fn code(&self) -> i64 {
        match self {
            StoreError::NotFound(_) => -32001,
            StoreError::InvalidContent(_) | StoreError::InvalidQuery(_) => -32602,
            StoreError::QuotaExceeded(_) => -32004,
            StoreError::ScoringUnavailable(_) => -32005,
            _ => -32000,
        }
    }

    /// Short machine-readable kind used in API error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::InvalidContent(_) => "invalid_content",
            StoreError::InvalidQuery(_) => "invalid_query",
            StoreError::NotFound(_) => "not_found",
            StoreError::QuotaExceeded(_) => "quota_exceeded",
            StoreError::ScoringUnavailable(_) => "scoring_unavailable",
            StoreError::Serialization(_) => "serialization",
            StoreError::Persistence(_) | StoreError::Io(_) => "persistence",
            StoreError::Config(_) => "config",
            StoreError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_large_surfaces_as_invalid_content() {
        let err: StoreError = CacheError::TooLarge { size: 70000, max: 65536 }.into();
        assert!(matches!(err, StoreError::InvalidContent(_)));
        assert_eq!(err.code(), -32602);
        assert!(err.to_string().contains("65536"));
    }

    #[test]
    fn test_retryable() {
        assert!(StoreError::ScoringUnavailable("timeout".into()).is_retryable());
        assert!(!StoreError::NotFound("x".into()).is_retryable());
        assert!(!StoreError::InvalidContent("content".into()).is_retryable());
    }
}
