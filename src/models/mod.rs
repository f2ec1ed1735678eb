mod config;
mod document;
mod search;

pub use config::{
    Config, DEFAULT_COLLECTION, DEFAULT_CONCURRENCY, DEFAULT_TOP_K, DEFAULT_VECTORIZER_HOST,
    DEFAULT_VECTORIZER_PORT, DEFAULT_WORKER_THREADS, DispatchMode, EmbeddingConfig, RetrySettings,
    SearchConfig, VectorStoreConfig,
};
pub use document::{Document, Embedding, Metadata, MetadataValue};
pub use search::{OutputFormat, SearchResult, SearchResults};
