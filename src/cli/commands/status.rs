use anyhow::{Context, Result};

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::{BlockingPool, create_store};

pub async fn handle_status(
    config: &Config,
    pool: &BlockingPool,
    format: OutputFormat,
) -> Result<()> {
    let formatter = get_formatter(format);
    let store = create_store(config, pool.clone()).context("failed to open vector store")?;

    let (storage, embedding) = store.health_check().await;
    if let Err(ref e) = embedding {
        tracing::debug!(error = %e, "embedding server health check failed");
    }

    let mut collections = Vec::new();
    if storage.is_ok() {
        for name in store.list_collections().await? {
            let count = store.count(&name).await?;
            collections.push((name, count));
        }
    }

    let status = StatusInfo {
        embedding_url: config.embedding.base_url(),
        embedding_healthy: embedding.is_ok(),
        database_path: config.vector_store.path.display().to_string(),
        database_healthy: storage.is_ok(),
        worker_threads: pool.capacity(),
        collections,
    };

    print!("{}", formatter.format_status(&status));

    if !status.embedding_healthy {
        eprintln!();
        eprintln!(
            "Warning: embedding server not reachable at {}. Set VECTORIZER_HOST/VECTORIZER_PORT or edit the config.",
            status.embedding_url
        );
    }

    Ok(())
}
