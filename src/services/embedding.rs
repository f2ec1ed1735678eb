//! Embedding client for turning texts into vectors via the embedding server.

use async_trait::async_trait;
use futures::future::try_join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::EmbeddingError;
use crate::models::{DispatchMode, Embedding, EmbeddingConfig};
use crate::utils::{RetryConfig, with_retry};

/// Request body for the /embed endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EmbedRequest {
    pub inputs: Vec<String>,
    pub normalize: bool,
    pub truncate: bool,
}

/// Response from the /embed endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse(Vec<Vec<f32>>);

/// One open session with the embedding server.
#[async_trait]
pub trait EmbedTransport: Send + Sync {
    /// Send a single request and return one embedding per input.
    async fn embed(&self, request: &EmbedRequest) -> Result<Vec<Embedding>, EmbeddingError>;

    /// Check that the server answers a one-text embed request.
    async fn health_check(&self) -> Result<(), EmbeddingError>;
}

/// Opens sessions with the embedding server.
pub trait Connector: Send + Sync {
    type Transport: EmbedTransport;

    fn connect(&self) -> Result<Self::Transport, EmbeddingError>;
}

/// Connects to an HTTP embedding server.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    base_url: String,
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            base_url: config.base_url(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Get the base URL of the embedding server.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Connector for HttpConnector {
    type Transport = HttpSession;

    fn connect(&self) -> Result<HttpSession, EmbeddingError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(HttpSession {
            client,
            base_url: self.base_url.clone(),
        })
    }
}

/// HTTP session; its connection pool is released on drop.
#[derive(Debug)]
pub struct HttpSession {
    client: Client,
    base_url: String,
}

#[async_trait]
impl EmbedTransport for HttpSession {
    async fn embed(&self, request: &EmbedRequest) -> Result<Vec<Embedding>, EmbeddingError> {
        let url = format!("{}/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else {
                    EmbeddingError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError { status, body });
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        Ok(embed_response.0)
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        let ping = EmbedRequest {
            inputs: vec!["ping".to_string()],
            normalize: true,
            truncate: true,
        };
        let embeddings = self.embed(&ping).await?;
        if embeddings.len() != 1 {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected 1 embedding, got {}",
                embeddings.len()
            )));
        }
        Ok(())
    }
}

/// Splits texts into requests, schedules them under a concurrency bound,
/// retries each one independently and returns embeddings in input order.
///
/// Owns its session for its whole lifetime: open one per operation and let it
/// drop when the operation is done.
pub struct Vectorizer<T: EmbedTransport> {
    transport: T,
    batch_size: usize,
    concurrency: usize,
    dispatch: DispatchMode,
    normalize: bool,
    truncate: bool,
    retry: RetryConfig,
}

impl<T: EmbedTransport> Vectorizer<T> {
    /// Open a session through `connector`.
    pub fn open<C>(
        connector: &C,
        config: &EmbeddingConfig,
        retry: RetryConfig,
    ) -> Result<Self, EmbeddingError>
    where
        C: Connector<Transport = T>,
    {
        let transport = connector.connect()?;
        tracing::debug!("opened embedding session");
        Ok(Self {
            transport,
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
            dispatch: config.dispatch,
            normalize: config.normalize,
            truncate: config.truncate,
            retry,
        })
    }

    /// Override the number of texts per request.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn health_check(&self) -> Result<(), EmbeddingError> {
        self.transport.health_check().await
    }

    /// Embed `texts`, returning exactly one embedding per text in the same order.
    pub async fn vectorize(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let mut groups = self.vectorize_many(&[texts]).await?;
        Ok(groups.pop().unwrap_or_default())
    }

    /// Embed a single query text.
    pub async fn vectorize_query(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.vectorize(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    /// Embed several groups of texts over one request schedule.
    ///
    /// Every group is split into requests of `batch_size`; all requests share
    /// the concurrency bound, and the results are regrouped so that
    /// `result[g][i]` is the embedding of `groups[g][i]`.
    pub async fn vectorize_many(
        &self,
        groups: &[&[String]],
    ) -> Result<Vec<Vec<Embedding>>, EmbeddingError> {
        let requests: Vec<(usize, &[String])> = groups
            .iter()
            .enumerate()
            .flat_map(|(group, texts)| {
                texts
                    .chunks(self.batch_size)
                    .map(move |chunk| (group, chunk))
            })
            .collect();

        let mut regrouped: Vec<Vec<Embedding>> = groups
            .iter()
            .map(|texts| Vec::with_capacity(texts.len()))
            .collect();

        if requests.is_empty() {
            return Ok(regrouped);
        }

        tracing::debug!(
            requests = requests.len(),
            concurrency = self.concurrency,
            "starting embedding requests"
        );

        let responses = match self.dispatch {
            DispatchMode::Windowed => self.dispatch_windowed(&requests).await?,
            DispatchMode::Pipelined => self.dispatch_pipelined(&requests).await?,
        };

        for ((group, _), embeddings) in requests.iter().zip(responses) {
            regrouped[*group].extend(embeddings);
        }
        Ok(regrouped)
    }

    async fn dispatch_windowed(
        &self,
        requests: &[(usize, &[String])],
    ) -> Result<Vec<Vec<Embedding>>, EmbeddingError> {
        let mut responses = Vec::with_capacity(requests.len());
        for (window, chunk) in requests.chunks(self.concurrency).enumerate() {
            tracing::debug!(window, size = chunk.len(), "embedding window");
            let mut posts = Vec::with_capacity(chunk.len());
            for (_, texts) in chunk {
                posts.push(self.post(texts));
            }
            responses.extend(try_join_all(posts).await?);
        }
        Ok(responses)
    }

    async fn dispatch_pipelined(
        &self,
        requests: &[(usize, &[String])],
    ) -> Result<Vec<Vec<Embedding>>, EmbeddingError> {
        let mut posts = Vec::with_capacity(requests.len());
        for (_, texts) in requests {
            posts.push(self.post(texts));
        }
        stream::iter(posts)
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    /// One request with its own retry loop. A response that does not carry
    /// exactly one embedding per input counts as a failed attempt.
    async fn post(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let request = EmbedRequest {
            inputs: texts.to_vec(),
            normalize: self.normalize,
            truncate: self.truncate,
        };
        let request = &request;
        let transport = &self.transport;

        with_retry(&self.retry, || async move {
            let embeddings = transport.embed(request).await?;
            if embeddings.len() != request.inputs.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    request.inputs.len(),
                    embeddings.len()
                )));
            }
            Ok(embeddings)
        })
        .await
        .into_result_or(|last_error, attempts| EmbeddingError::ExhaustedRetries {
            attempts,
            last_error: Box::new(last_error),
        })
    }
}

impl<T: EmbedTransport> Drop for Vectorizer<T> {
    fn drop(&mut self) {
        tracing::debug!("closed embedding session");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::Ordering;

    fn numbered(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    fn config(batch_size: usize, dispatch: DispatchMode) -> EmbeddingConfig {
        EmbeddingConfig {
            batch_size,
            dispatch,
            ..Default::default()
        }
    }

    fn open(connector: &MockConnector, config: &EmbeddingConfig) -> Vectorizer<MockSession> {
        Vectorizer::open(connector, config, fast_retry()).unwrap()
    }

    #[test]
    fn test_http_connector_base_url() {
        let config = EmbeddingConfig {
            host: "http://embedder/".to_string(),
            port: 7997,
            ..Default::default()
        };
        let connector = HttpConnector::new(&config);
        assert_eq!(connector.base_url(), "http://embedder:7997");
        assert!(connector.connect().is_ok());
    }

    #[test]
    fn test_request_body_shape() {
        let request = EmbedRequest {
            inputs: vec!["a".to_string()],
            normalize: false,
            truncate: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"inputs": ["a"], "normalize": false, "truncate": true})
        );
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_requests() {
        let connector = MockConnector::new();
        let vectorizer = open(&connector, &EmbeddingConfig::default());
        let result = vectorizer.vectorize(&[]).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(connector.state.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_output_matches_input_order() {
        for dispatch in [DispatchMode::Windowed, DispatchMode::Pipelined] {
            let connector = MockConnector::new();
            let vectorizer = open(&connector, &config(7, dispatch));
            let texts = numbered(53);
            let embeddings = vectorizer.vectorize(&texts).await.unwrap();
            assert_eq!(embeddings.len(), texts.len());
            for (i, embedding) in embeddings.iter().enumerate() {
                assert_eq!(embedding[0], i as f32, "{dispatch:?}");
            }
            assert_eq!(connector.state.calls.load(Ordering::SeqCst), 8);
            assert!(connector.state.max_in_flight.load(Ordering::SeqCst) <= 4);
        }
    }

    #[tokio::test]
    async fn test_windows_do_not_overlap() {
        let connector = MockConnector::new();
        let vectorizer = open(&connector, &config(1, DispatchMode::Windowed));
        vectorizer.vectorize(&numbered(5)).await.unwrap();

        let events = connector.state.events.lock().unwrap().clone();
        let fifth_start = events.iter().position(|e| *e == Event::Start(4)).unwrap();
        let ends_before = events[..fifth_start]
            .iter()
            .filter(|e| matches!(e, Event::End(_)))
            .count();
        assert_eq!(ends_before, 4);
        assert_eq!(connector.state.max_in_flight.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retries_do_not_duplicate_or_drop() {
        for k in [0, 1, 3] {
            let connector = MockConnector::failing_first(k);
            let vectorizer = open(&connector, &config(4, DispatchMode::Windowed));
            let texts = numbered(10);
            let embeddings = vectorizer.vectorize(&texts).await.unwrap();
            let firsts: Vec<f32> = embeddings.iter().map(|e| e[0]).collect();
            assert_eq!(firsts, (0..10).map(|i| i as f32).collect::<Vec<_>>());
            assert_eq!(connector.state.successful_calls().iter().sum::<usize>(), 10);
        }
    }

    #[tokio::test]
    async fn test_short_response_is_retried() {
        let connector = MockConnector::new();
        connector.state.short_first.store(1, Ordering::SeqCst);
        let vectorizer = open(&connector, &config(3, DispatchMode::Windowed));
        let embeddings = vectorizer.vectorize(&numbered(3)).await.unwrap();
        assert_eq!(embeddings.len(), 3);
        assert_eq!(connector.state.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bounded_retry_surfaces_exhaustion() {
        let connector = MockConnector::failing_first(100);
        let retry = RetryConfig {
            max_attempts: Some(2),
            ..fast_retry()
        };
        let vectorizer = Vectorizer::open(&connector, &config(10, DispatchMode::Windowed), retry)
            .unwrap();
        let err = vectorizer.vectorize(&numbered(2)).await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::ExhaustedRetries { attempts: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_vectorize_many_regroups() {
        let connector = MockConnector::new();
        let vectorizer = open(&connector, &config(50, DispatchMode::Windowed));
        let all = numbered(250);
        let groups: Vec<&[String]> = all.chunks(100).collect();
        let result = vectorizer.vectorize_many(&groups).await.unwrap();

        let sizes: Vec<usize> = result.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        assert_eq!(result[2][0][0], 200.0);
        assert_eq!(connector.state.successful_calls(), vec![50; 5]);
    }

    #[tokio::test]
    async fn test_session_released_on_drop() {
        let connector = MockConnector::new();
        {
            let vectorizer = open(&connector, &EmbeddingConfig::default());
            vectorizer.vectorize_query("hello").await.unwrap();
        }
        assert_eq!(connector.state.sessions_opened.load(Ordering::SeqCst), 1);
        assert_eq!(connector.state.sessions_closed.load(Ordering::SeqCst), 1);
    }

    mod http {
        use super::*;
        use crate::utils::Retryable;
        use std::sync::Arc;
        use std::sync::atomic::AtomicUsize;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};

        type Handler = Arc<dyn Fn(&str, usize) -> (u16, String) + Send + Sync>;

        /// Read one request and return its path.
        async fn read_request(socket: &mut TcpStream) -> String {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    return String::new();
                }
                buf.extend_from_slice(&chunk[..n]);
                let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&buf[..end]).to_string();
                let body_len = head
                    .lines()
                    .find_map(|line| {
                        let (key, value) = line.split_once(':')?;
                        key.trim()
                            .eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                while buf.len() < end + 4 + body_len {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                return head.split_whitespace().nth(1).unwrap_or_default().to_string();
            }
        }

        /// Serve every connection with `handler(path, call_index)`.
        async fn serve(handler: Handler) -> (EmbeddingConfig, Arc<AtomicUsize>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let calls = Arc::new(AtomicUsize::new(0));

            let counter = Arc::clone(&calls);
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let handler = Arc::clone(&handler);
                    let counter = Arc::clone(&counter);
                    tokio::spawn(async move {
                        let path = read_request(&mut socket).await;
                        let call = counter.fetch_add(1, Ordering::SeqCst);
                        let (status, body) = handler(&path, call);
                        let response = format!(
                            "HTTP/1.1 {status} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                            body.len()
                        );
                        socket.write_all(response.as_bytes()).await.unwrap();
                        let _ = socket.shutdown().await;
                    });
                }
            });

            let config = EmbeddingConfig {
                host: "http://127.0.0.1".to_string(),
                port,
                timeout_secs: 5,
                ..Default::default()
            };
            (config, calls)
        }

        fn flaky_then_ok() -> Handler {
            Arc::new(|_: &str, call: usize| match call {
                0 => (500, "boom".to_string()),
                1 => (200, "not json".to_string()),
                _ => (200, "[[0.5,1.5]]".to_string()),
            })
        }

        fn request(text: &str) -> EmbedRequest {
            EmbedRequest {
                inputs: vec![text.to_string()],
                normalize: true,
                truncate: true,
            }
        }

        #[tokio::test]
        async fn test_health_check_against_embed_only_server() {
            let (config, calls) = serve(Arc::new(|path: &str, _: usize| {
                if path == "/embed" {
                    (200, "[[1.0,2.0]]".to_string())
                } else {
                    (404, String::new())
                }
            }))
            .await;

            let session = HttpConnector::new(&config).connect().unwrap();
            session.health_check().await.unwrap();
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_health_check_rejects_empty_answer() {
            let (config, _) = serve(Arc::new(|_: &str, _: usize| (200, "[]".to_string()))).await;
            let session = HttpConnector::new(&config).connect().unwrap();
            let err = session.health_check().await.unwrap_err();
            assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
        }

        #[tokio::test]
        async fn test_http_errors_map_to_retryable_kinds() {
            let (config, _) = serve(flaky_then_ok()).await;
            let session = HttpConnector::new(&config).connect().unwrap();

            let err = session.embed(&request("hello")).await.unwrap_err();
            assert!(matches!(
                err,
                EmbeddingError::ServerError { status: 500, ref body } if body == "boom"
            ));
            assert!(err.is_retryable());

            let err = session.embed(&request("hello")).await.unwrap_err();
            assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
            assert!(err.is_retryable());

            let embeddings = session.embed(&request("hello")).await.unwrap();
            assert_eq!(embeddings, vec![vec![0.5, 1.5]]);
        }

        #[tokio::test]
        async fn test_vectorizer_recovers_over_http() {
            let (config, calls) = serve(flaky_then_ok()).await;
            let vectorizer =
                Vectorizer::open(&HttpConnector::new(&config), &config, fast_retry()).unwrap();

            let embeddings = vectorizer.vectorize(&["hello".to_string()]).await.unwrap();
            assert_eq!(embeddings, vec![vec![0.5, 1.5]]);
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        }
    }
}
