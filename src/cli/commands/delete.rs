use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::{BlockingPool, VectorStore, create_store};

#[derive(Debug, Args)]
pub struct DeleteArgs {
    #[arg(required = true, help = "Document ids to delete")]
    pub ids: Vec<String>,

    #[arg(long, short = 'c', help = "Collection to delete from")]
    pub collection: Option<String>,
}

pub async fn handle_delete(
    args: DeleteArgs,
    config: &Config,
    pool: &BlockingPool,
    format: OutputFormat,
) -> Result<()> {
    let formatter = get_formatter(format);
    let collection = args
        .collection
        .unwrap_or_else(|| config.search.default_collection.clone());
    let count = args.ids.len();

    let store = create_store(config, pool.clone()).context("failed to open vector store")?;
    let pending = store
        .delete(&collection, args.ids)
        .await
        .context("failed to schedule delete")?;

    // The process exits right after this command, so wait for the background
    // delete instead of letting the runtime drop it.
    pending.wait().await.context("delete failed")?;

    print!(
        "{}",
        formatter.format_message(&format!("Deleted {count} ids from {collection}"))
    );
    Ok(())
}
