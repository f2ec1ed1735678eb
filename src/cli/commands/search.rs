use anyhow::{Context, Result};
use clap::Args;
use std::time::Instant;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat, SearchResults};
use crate::services::{BlockingPool, VectorStore, create_store};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'c', help = "Collection to search")]
    pub collection: Option<String>,

    #[arg(long, short = 'k', help = "Maximum number of results to return")]
    pub top_k: Option<usize>,
}

pub async fn handle_search(
    args: SearchArgs,
    config: &Config,
    pool: &BlockingPool,
    format: OutputFormat,
) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let top_k = args.top_k.unwrap_or(config.search.top_k);
    if top_k == 0 {
        anyhow::bail!("top_k must be at least 1");
    }

    let collection = args
        .collection
        .unwrap_or_else(|| config.search.default_collection.clone());
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    tracing::debug!(query, %collection, top_k, "searching");

    let store = create_store(config, pool.clone()).context("failed to open vector store")?;
    let results = store
        .search(query, &collection, top_k)
        .await
        .context("search failed")?;

    let duration_ms = start_time.elapsed().as_millis() as u64;
    let search_results = SearchResults::new(query.to_string(), collection, results, duration_ms);

    print!("{}", formatter.format_search_results(&search_results));

    Ok(())
}
