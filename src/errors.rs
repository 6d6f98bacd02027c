//! Error types for the EstateWise chat core
//!
//! Soft-dependency failures (search, completion, cache) are represented here
//! so collaborators can report them, but the orchestrator recovers from them
//! locally. Only configuration errors and weight-store write failures are
//! surfaced to callers.

use thiserror::Error;

/// Main error type for the chat pipeline
#[derive(Error, Debug)]
pub enum ChatError {
    /// Configuration errors (fatal at startup)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Similarity search collaborator errors
    #[error("Similarity search error: {0}")]
    SearchError(String),

    /// Text-completion collaborator errors
    #[error("Completion service error: {0}")]
    CompletionError(String),

    /// Response cache backend errors
    #[error("Cache backend error: {0}")]
    CacheError(String),

    /// Durable weight store errors
    #[error("Weight store error: {0}")]
    WeightStoreError(String),

    /// Feedback for a reply the ledger never saw
    #[error("Unknown message {message_id} in conversation {conversation_id}")]
    UnknownMessage {
        message_id: String,
        conversation_id: String,
    },

    /// Rating values other than +1 / -1
    #[error("Invalid rating value {0}: expected +1 or -1")]
    InvalidRating(i64),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Generic errors with context
    #[error("Chat error: {0}")]
    Generic(String),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, ChatError>;

impl ChatError {
    /// Build a timeout error from an elapsed budget
    pub fn timeout(budget: std::time::Duration) -> Self {
        ChatError::Timeout {
            duration_ms: budget.as_millis() as u64,
        }
    }

    /// Whether the error belongs to a soft dependency
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            ChatError::SearchError(_)
                | ChatError::CompletionError(_)
                | ChatError::CacheError(_)
                | ChatError::HttpError(_)
                | ChatError::Timeout { .. }
        )
    }
}

/// Convert anyhow errors to ChatError
impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        ChatError::Generic(err.to_string())
    }
}
