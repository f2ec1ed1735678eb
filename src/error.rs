//! Error types for ragstore.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding server: {0}")]
    ConnectionError(String),

    #[error("embedding server error: status {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,

    #[error("embedding gave up after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        attempts: u32,
        last_error: Box<EmbeddingError>,
    },
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            // A client that cannot be built will not build on the next try either
            EmbeddingError::ConnectionError(_) => false,
            EmbeddingError::ExhaustedRetries { .. } => false,
            // Anything the server or the network did wrong is transient
            EmbeddingError::ServerError { .. }
            | EmbeddingError::RequestError(_)
            | EmbeddingError::InvalidResponse(_)
            | EmbeddingError::Timeout => true,
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error("misaligned backend response: {0}")]
    Misaligned(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("stored record cannot be decoded: {0}")]
    CorruptRecord(String),

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("storage call gave up after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        attempts: u32,
        last_error: Box<VectorStoreError>,
    },
}

impl From<rusqlite::Error> for VectorStoreError {
    fn from(e: rusqlite::Error) -> Self {
        VectorStoreError::Backend(e.to_string())
    }
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            VectorStoreError::Backend(_)
            | VectorStoreError::CollectionError(_)
            | VectorStoreError::Misaligned(_) => true,
            // Embedding calls carry their own retry loop
            VectorStoreError::Embedding(_) => false,
            VectorStoreError::WorkerPool(_)
            | VectorStoreError::InvalidInput(_)
            | VectorStoreError::CorruptRecord(_) => false,
            VectorStoreError::ExhaustedRetries { .. } => false,
        }
    }
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors related to import operations.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}
