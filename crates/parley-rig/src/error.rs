//! Error types for parley-rig.

use std::fmt;

use parley_postgres::PgError;
use rig::embeddings::{EmbedError, EmbeddingError};
use rig::vector_store::VectorStoreError;

/// Result type alias for rig operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur during rig operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error (unknown model id, missing API key, invalid sizes).
    #[error("configuration error: {0}")]
    Config(String),

    /// Provider error (API call failed, rate limited, malformed stream).
    #[error("provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    /// Retrieval error from web search or a vector index.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Document could not be read or its format is unsupported.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// File or index storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A session, message or file does not exist for the caller.
    #[error("{0}")]
    NotFound(String),

    /// Caller supplied an invalid argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The turn was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] PgError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a configuration error.
    pub fn config(message: impl fmt::Display) -> Self {
        Self::Config(message.to_string())
    }

    /// Creates a provider error.
    pub fn provider(provider: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Provider {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    /// Creates a retrieval error.
    pub fn retrieval(message: impl fmt::Display) -> Self {
        Self::Retrieval(message.to_string())
    }

    /// Creates an embedding error.
    pub fn embedding(message: impl fmt::Display) -> Self {
        Self::Embedding(message.to_string())
    }

    /// Creates an extraction error.
    pub fn extraction(message: impl fmt::Display) -> Self {
        Self::Extraction(message.to_string())
    }

    /// Creates a storage error.
    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Creates a not-found error with a client-visible message.
    pub fn not_found(message: impl fmt::Display) -> Self {
        Self::NotFound(message.to_string())
    }

    /// Creates an invalid input error.
    pub fn invalid_input(message: impl fmt::Display) -> Self {
        Self::InvalidInput(message.to_string())
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { .. } | Self::Io(_) => true,
            Self::Database(error) => error.is_transient(),
            _ => false,
        }
    }

    /// Returns true if this is a fatal configuration error.
    pub fn is_fatal_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if the error means the requested item does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<EmbeddingError> for Error {
    fn from(error: EmbeddingError) -> Self {
        Self::Embedding(error.to_string())
    }
}

impl From<EmbedError> for Error {
    fn from(error: EmbedError) -> Self {
        Self::Embedding(error.to_string())
    }
}

impl From<VectorStoreError> for Error {
    fn from(error: VectorStoreError) -> Self {
        match error {
            VectorStoreError::EmbeddingError(error) => error.into(),
            VectorStoreError::JsonError(error) => error.into(),
            error => Self::Retrieval(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_displays_bare_message() {
        let error = Error::not_found("Session not found");
        assert_eq!(error.to_string(), "Session not found");
        assert!(error.is_not_found());
    }

    #[test]
    fn config_errors_are_fatal_and_not_retryable() {
        let error = Error::config("model missing not found in configuration");
        assert!(error.is_fatal_config());
        assert!(!error.is_retryable());
        assert!(Error::provider("openai", "429").is_retryable());
    }
}
