//! `VectorStore` implementation over any blocking `StorageBackend`.

use async_trait::async_trait;
use std::sync::Arc;

use super::{Collection, PendingDelete, QueryResult, StorageBackend, VectorStore};
use crate::error::VectorStoreError;
use crate::models::{Document, EmbeddingConfig, SearchResult};
use crate::services::batch::{Batch, to_batches};
use crate::services::blocking::BlockingPool;
use crate::services::embedding::{Connector, HttpConnector, Vectorizer};
use crate::utils::RetryConfig;

const DEFAULT_PARALLELISM: usize = 1000;

/// Ties a storage backend to the embedding server.
///
/// Inserts are vectorized in one session per call and written one outer batch
/// at a time; every backend call goes through the shared `BlockingPool`.
pub struct StoreDriver<B: StorageBackend, C: Connector = HttpConnector> {
    backend: Arc<B>,
    connector: C,
    pool: BlockingPool,
    embedding: EmbeddingConfig,
    retry: RetryConfig,
    parallelism: usize,
}

impl<B: StorageBackend, C: Connector> StoreDriver<B, C> {
    pub fn new(
        backend: B,
        connector: C,
        pool: BlockingPool,
        embedding: EmbeddingConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            backend: Arc::new(backend),
            connector,
            pool,
            embedding,
            retry,
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    /// Set the number of documents written per upsert.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn pool(&self) -> &BlockingPool {
        &self.pool
    }

    fn open_vectorizer(&self) -> Result<Vectorizer<C::Transport>, VectorStoreError> {
        Ok(Vectorizer::open(
            &self.connector,
            &self.embedding,
            self.retry.clone(),
        )?)
    }

    async fn collection(&self, name: &str) -> Result<B::Collection, VectorStoreError> {
        let backend = Arc::clone(&self.backend);
        let name = name.to_string();
        self.pool
            .run(move || backend.get_or_create_collection(&name))
            .await
    }

    /// Number of records in `collection`.
    pub async fn count(&self, collection: &str) -> Result<usize, VectorStoreError> {
        let handle = self.collection(collection).await?;
        self.pool.run(move || handle.count()).await
    }

    pub async fn list_collections(&self) -> Result<Vec<String>, VectorStoreError> {
        let backend = Arc::clone(&self.backend);
        self.pool.run(move || backend.list_collections()).await
    }

    /// Check the storage backend and the embedding server.
    pub async fn health_check(
        &self,
    ) -> (Result<(), VectorStoreError>, Result<(), VectorStoreError>) {
        let backend = Arc::clone(&self.backend);
        let storage = self.pool.run(move || backend.health_check()).await;
        let embedding = match self.open_vectorizer() {
            Ok(vectorizer) => vectorizer.health_check().await.map_err(Into::into),
            Err(e) => Err(e),
        };
        (storage, embedding)
    }
}

fn zip_query(result: QueryResult) -> Result<Vec<SearchResult>, VectorStoreError> {
    let QueryResult {
        ids,
        documents,
        metadatas,
        distances,
    } = result;

    let (Some(ids), Some(documents), Some(metadatas), Some(distances)) = (
        ids.into_iter().next(),
        documents.into_iter().next(),
        metadatas.into_iter().next(),
        distances.into_iter().next(),
    ) else {
        return Err(VectorStoreError::Misaligned(
            "query returned no result set".to_string(),
        ));
    };

    let n = ids.len();
    if documents.len() != n || metadatas.len() != n || distances.len() != n {
        return Err(VectorStoreError::Misaligned(format!(
            "query columns differ in length: ids={n}, documents={}, metadatas={}, distances={}",
            documents.len(),
            metadatas.len(),
            distances.len()
        )));
    }

    Ok(ids
        .into_iter()
        .zip(documents)
        .zip(metadatas)
        .zip(distances)
        .map(|(((id, text), metadata), distance)| SearchResult {
            id,
            text,
            metadata,
            distance,
        })
        .collect())
}

#[async_trait]
impl<B: StorageBackend, C: Connector> VectorStore for StoreDriver<B, C> {
    async fn insert(
        &self,
        documents: &[Document],
        collection: &str,
        batch_size: usize,
    ) -> Result<(), VectorStoreError> {
        let handle = self.collection(collection).await?;
        let batches = to_batches(documents, self.parallelism);
        if batches.is_empty() {
            return Ok(());
        }

        tracing::info!(
            collection,
            documents = documents.len(),
            batches = batches.len(),
            "inserting documents"
        );

        let embeddings = {
            let vectorizer = self.open_vectorizer()?.with_batch_size(batch_size);
            let groups: Vec<&[String]> = batches.iter().map(Batch::texts).collect();
            vectorizer.vectorize_many(&groups).await?
        };

        for (index, (batch, embeddings)) in batches.into_iter().zip(embeddings).enumerate() {
            let handle = handle.clone();
            let size = batch.len();
            self.pool
                .run(move || {
                    handle.upsert(batch.ids(), &embeddings, batch.metadatas(), batch.texts())
                })
                .await?;
            tracing::debug!(collection, batch = index, size, "upserted batch");
        }
        Ok(())
    }

    async fn delete(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> Result<PendingDelete, VectorStoreError> {
        let handle = self.collection(collection).await?;
        tracing::debug!(collection = handle.name(), ids = ids.len(), "scheduling delete");
        Ok(self.pool.spawn("delete", move || handle.delete(&ids)))
    }

    async fn get(
        &self,
        collection: &str,
        ids: Vec<String>,
    ) -> Result<Vec<Document>, VectorStoreError> {
        let handle = self.collection(collection).await?;
        let result = self.pool.run(move || handle.get(&ids)).await?;

        let n = result.ids.len();
        if result.documents.len() != n || result.metadatas.len() != n {
            return Err(VectorStoreError::Misaligned(format!(
                "get columns differ in length: ids={n}, documents={}, metadatas={}",
                result.documents.len(),
                result.metadatas.len()
            )));
        }

        Ok(result
            .ids
            .into_iter()
            .zip(result.documents)
            .zip(result.metadatas)
            .map(|((id, text), metadata)| Document { id, text, metadata })
            .collect())
    }

    async fn search(
        &self,
        query: &str,
        collection: &str,
        top_k: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let handle = self.collection(collection).await?;

        let embedding = {
            let vectorizer = self.open_vectorizer()?;
            vectorizer.vectorize_query(query).await?
        };

        let result = self
            .pool
            .run(move || handle.query(std::slice::from_ref(&embedding), top_k))
            .await?;
        zip_query(result)
    }
}
