//! Vector store abstraction layer.
//!
//! `VectorStore` is what callers use: documents in, documents and hits out.
//! Underneath, a `StorageBackend` provides blocking collection handles that
//! the driver runs through the shared `BlockingPool`.

mod driver;
mod sqlite;

pub use driver::StoreDriver;
pub use sqlite::{SqliteBackend, SqliteCollection};

use async_trait::async_trait;

use crate::error::VectorStoreError;
use crate::models::{Config, Document, Embedding, Metadata, SearchResult};
use crate::services::blocking::{BlockingPool, PendingTask};
use crate::services::embedding::HttpConnector;

/// Handle to a delete running in the background.
pub type PendingDelete = PendingTask<()>;

/// Records returned by a lookup, as parallel columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetResult {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
}

/// Nearest neighbours, one inner list per query embedding, each ordered by
/// ascending distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub ids: Vec<Vec<String>>,
    pub documents: Vec<Vec<String>>,
    pub metadatas: Vec<Vec<Metadata>>,
    pub distances: Vec<Vec<f32>>,
}

/// A named partition of a storage backend. Every call blocks.
pub trait Collection: Clone + Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Insert or replace records. All four slices are index-aligned.
    fn upsert(
        &self,
        ids: &[String],
        embeddings: &[Embedding],
        metadatas: &[Metadata],
        documents: &[String],
    ) -> Result<(), VectorStoreError>;

    fn delete(&self, ids: &[String]) -> Result<(), VectorStoreError>;

    /// Look up records by id. Unknown ids are left out.
    fn get(&self, ids: &[String]) -> Result<GetResult, VectorStoreError>;

    /// Up to `n_results` nearest records for each query embedding.
    fn query(
        &self,
        query_embeddings: &[Embedding],
        n_results: usize,
    ) -> Result<QueryResult, VectorStoreError>;

    fn count(&self) -> Result<usize, VectorStoreError>;
}

/// A blocking storage engine that hands out collections by name.
pub trait StorageBackend: Send + Sync + 'static {
    type Collection: Collection;

    /// Return the named collection, creating it on first use.
    fn get_or_create_collection(&self, name: &str) -> Result<Self::Collection, VectorStoreError>;

    fn list_collections(&self) -> Result<Vec<String>, VectorStoreError>;

    fn health_check(&self) -> Result<(), VectorStoreError>;
}

/// Document-level store operations.
///
/// Implementations vectorize text themselves; callers never see embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed and upsert `documents` into `collection`. `batch_size` is the
    /// number of texts per embedding request.
    async fn insert(
        &self,
        documents: &[Document],
        collection: &str,
        batch_size: usize,
    ) -> Result<(), VectorStoreError>;

    /// Start deleting `ids` in the background.
    async fn delete(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> Result<PendingDelete, VectorStoreError>;

    async fn get(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> Result<Vec<Document>, VectorStoreError>;

    /// Up to `top_k` documents closest to `query`, nearest first.
    async fn search(
        &self,
        query: &str,
        collection: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError>;
}

/// Build the SQLite-backed store described by `config`.
pub fn create_store(
    config: &Config,
    pool: BlockingPool,
) -> Result<StoreDriver<SqliteBackend>, VectorStoreError> {
    let backend = SqliteBackend::open(&config.vector_store.path)?;
    Ok(StoreDriver::new(
        backend,
        HttpConnector::new(&config.embedding),
        pool,
        config.embedding.clone(),
        config.retry.to_retry_config(),
    )
    .with_parallelism(config.vector_store.parallelism))
}
