//! Bounded pool for blocking storage calls.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::VectorStoreError;
use crate::utils::{RetryConfig, with_retry};

/// Runs blocking calls off the async scheduler, at most `capacity` at a time,
/// retrying failures with the configured backoff.
///
/// Cloning is cheap and every clone shares the same capacity, so one pool
/// built at startup can be handed to every store driver.
#[derive(Debug, Clone)]
pub struct BlockingPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    retry: RetryConfig,
}

impl BlockingPool {
    pub fn new(capacity: usize, retry: RetryConfig) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            retry,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Workers not currently running a call.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `op` on a worker and wait for its result.
    ///
    /// `op` is called again for every retry, so it must be safe to repeat.
    pub async fn run<T, F>(&self, op: F) -> Result<T, VectorStoreError>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, VectorStoreError> + Send + Sync + 'static,
    {
        let op = Arc::new(op);
        with_retry(&self.retry, || self.run_once(Arc::clone(&op)))
            .await
            .into_result_or(|last_error, attempts| VectorStoreError::ExhaustedRetries {
                attempts,
                last_error: Box::new(last_error),
            })
    }

    /// Run `op` in the background. The returned handle may be awaited for the
    /// outcome or dropped; a failure is logged either way.
    pub fn spawn<T, F>(&self, label: &'static str, op: F) -> PendingTask<T>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, VectorStoreError> + Send + Sync + 'static,
    {
        let pool = self.clone();
        let handle = tokio::spawn(async move {
            let result = pool.run(op).await;
            if let Err(ref e) = result {
                tracing::error!(task = label, error = %e, "background storage call failed");
            }
            result
        });
        PendingTask { handle }
    }

    async fn run_once<T, F>(&self, op: Arc<F>) -> Result<T, VectorStoreError>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, VectorStoreError> + Send + Sync + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| VectorStoreError::WorkerPool(e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            op()
        })
        .await
        .map_err(|e| VectorStoreError::WorkerPool(e.to_string()))?
    }
}

/// Handle to a background storage call.
#[derive(Debug)]
pub struct PendingTask<T> {
    handle: JoinHandle<Result<T, VectorStoreError>>,
}

impl<T> PendingTask<T> {
    /// Wait for the call to finish and return its outcome.
    pub async fn wait(self) -> Result<T, VectorStoreError> {
        self.handle
            .await
            .map_err(|e| VectorStoreError::WorkerPool(e.to_string()))?
    }
}
