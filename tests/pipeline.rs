//! End-to-end pipeline tests against an in-process embedding server double
//! and an in-memory SQLite backend.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ragstore::error::EmbeddingError;
use ragstore::models::{Document, Embedding, EmbeddingConfig};
use ragstore::services::{
    BlockingPool, Connector, EmbedRequest, EmbedTransport, SqliteBackend, StoreDriver,
    VectorStore, Vectorizer,
};
use ragstore::utils::RetryConfig;

#[derive(Default)]
struct Recorder {
    attempts: AtomicUsize,
    fail_first: AtomicUsize,
    in_flight: AtomicUsize,
    /// Successful requests, tagged with how many were in flight when each started.
    served: Mutex<Vec<(usize, usize)>>,
}

#[derive(Clone, Default)]
struct FakeServer {
    recorder: Arc<Recorder>,
}

struct FakeSession {
    recorder: Arc<Recorder>,
}

impl Connector for FakeServer {
    type Transport = FakeSession;

    fn connect(&self) -> Result<FakeSession, EmbeddingError> {
        Ok(FakeSession {
            recorder: Arc::clone(&self.recorder),
        })
    }
}

fn embed_text(text: &str) -> Embedding {
    let bytes = text.as_bytes();
    let first = bytes.first().copied().unwrap_or(0) as f32;
    vec![bytes.len() as f32, first]
}

#[async_trait]
impl EmbedTransport for FakeSession {
    async fn embed(&self, request: &EmbedRequest) -> Result<Vec<Embedding>, EmbeddingError> {
        let r = &self.recorder;
        r.attempts.fetch_add(1, Ordering::SeqCst);
        let concurrent = r.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(10)).await;
        r.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failed = r
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(EmbeddingError::ServerError {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }

        r.served
            .lock()
            .unwrap()
            .push((request.inputs.len(), concurrent));
        Ok(request.inputs.iter().map(|t| embed_text(t)).collect())
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        Ok(())
    }
}

fn quick_retry() -> RetryConfig {
    RetryConfig::unbounded()
        .with_min_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(3))
        .with_multiplier(0.001)
}

fn store(server: &FakeServer, parallelism: usize) -> StoreDriver<SqliteBackend, FakeServer> {
    StoreDriver::new(
        SqliteBackend::in_memory().unwrap(),
        server.clone(),
        BlockingPool::new(10, quick_retry()),
        EmbeddingConfig::default(),
        quick_retry(),
    )
    .with_parallelism(parallelism)
}

fn documents(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| {
            Document::new(format!("doc-{i:03}"), format!("{}{}", "w".repeat(i % 17), i))
                .with_metadata("index", i as i64)
        })
        .collect()
}

#[tokio::test]
async fn insert_250_documents_in_five_requests_over_two_windows() {
    let server = FakeServer::default();
    let store = store(&server, 100);

    store.insert(&documents(250), "docs", 50).await.unwrap();

    let served = server.recorder.served.lock().unwrap().clone();
    let sizes: Vec<usize> = served.iter().map(|(size, _)| *size).collect();
    assert_eq!(sizes, vec![50; 5]);
    let peak = served.iter().map(|(_, c)| *c).max().unwrap();
    assert_eq!(peak, 4);
    // The fifth request runs alone in the second window.
    assert_eq!(served.last().map(|(_, c)| *c), Some(1));
    assert_eq!(store.count("docs").await.unwrap(), 250);
}

#[tokio::test]
async fn vectorize_empty_input_makes_no_calls() {
    let server = FakeServer::default();
    let vectorizer =
        Vectorizer::open(&server, &EmbeddingConfig::default(), quick_retry()).unwrap();
    assert!(vectorizer.vectorize(&[]).await.unwrap().is_empty());
    assert_eq!(server.recorder.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn vectorize_length_matches_input() {
    let server = FakeServer::default();
    let config = EmbeddingConfig {
        batch_size: 3,
        ..Default::default()
    };
    let vectorizer = Vectorizer::open(&server, &config, quick_retry()).unwrap();
    let texts: Vec<String> = (0..11).map(|i| "x".repeat(i + 1)).collect();
    let embeddings = vectorizer.vectorize(&texts).await.unwrap();
    assert_eq!(embeddings.len(), texts.len());
    for (text, embedding) in texts.iter().zip(&embeddings) {
        assert_eq!(embedding, &embed_text(text));
    }
}

#[tokio::test]
async fn insert_then_get_roundtrip() {
    let server = FakeServer::default();
    let store = store(&server, 1000);
    let docs = documents(20);
    store.insert(&docs, "docs", 8).await.unwrap();

    let wanted = vec![docs[3].id.clone(), docs[17].id.clone()];
    let found = store.get("docs", wanted).await.unwrap();
    assert_eq!(found, vec![docs[3].clone(), docs[17].clone()]);
}

#[tokio::test]
async fn transient_failures_leave_no_gaps_or_duplicates() {
    for k in [0, 1, 4] {
        let server = FakeServer::default();
        server.recorder.fail_first.store(k, Ordering::SeqCst);
        let store = store(&server, 10);
        let docs = documents(35);
        store.insert(&docs, "docs", 5).await.unwrap();

        let served: usize = server
            .recorder
            .served
            .lock()
            .unwrap()
            .iter()
            .map(|(size, _)| size)
            .sum();
        assert_eq!(served, 35, "k = {k}");
        assert_eq!(store.count("docs").await.unwrap(), 35);

        let all_ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
        assert_eq!(store.get("docs", all_ids).await.unwrap(), docs);
    }
}

#[tokio::test]
async fn search_returns_at_most_collection_size_sorted_by_distance() {
    let server = FakeServer::default();
    let store = store(&server, 1000);
    store
        .insert(
            &[
                Document::new("1", "hello there"),
                Document::new("2", "completely different"),
            ],
            "small",
            10,
        )
        .await
        .unwrap();

    let hits = store.search("hello", "small", 3).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert_eq!(hits[0].id, "1");
}

#[tokio::test]
async fn dropped_delete_still_applies() {
    let server = FakeServer::default();
    let store = store(&server, 1000);
    store.insert(&documents(3), "docs", 10).await.unwrap();

    drop(store.delete("docs", vec!["doc-001".to_string()]).await.unwrap());

    for _ in 0..200 {
        if store.count("docs").await.unwrap() == 2 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("background delete never landed");
}
