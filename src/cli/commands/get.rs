use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::{BlockingPool, VectorStore, create_store};

#[derive(Debug, Args)]
pub struct GetArgs {
    #[arg(required = true, help = "Document ids to fetch")]
    pub ids: Vec<String>,

    #[arg(long, short = 'c', help = "Collection to read from")]
    pub collection: Option<String>,
}

pub async fn handle_get(
    args: GetArgs,
    config: &Config,
    pool: &BlockingPool,
    format: OutputFormat,
) -> Result<()> {
    let formatter = get_formatter(format);
    let collection = args
        .collection
        .unwrap_or_else(|| config.search.default_collection.clone());

    let store = create_store(config, pool.clone()).context("failed to open vector store")?;
    let documents = store
        .get(&collection, args.ids)
        .await
        .context("lookup failed")?;

    print!("{}", formatter.format_documents(&documents));
    Ok(())
}
