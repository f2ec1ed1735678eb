//! Insert command implementation.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::cli::output::{InsertStats, get_formatter};
use crate::error::ImportError;
use crate::models::{Config, Document, Metadata, OutputFormat};
use crate::services::{BlockingPool, VectorStore, create_store};

/// Arguments for the insert command.
#[derive(Debug, Args)]
pub struct InsertArgs {
    /// Path to JSON or JSONL file (use - for stdin)
    #[arg()]
    pub file: Option<PathBuf>,

    /// Target collection
    #[arg(long, short = 'c')]
    pub collection: Option<String>,

    /// Texts per embedding request
    #[arg(long, short = 'b')]
    pub batch_size: Option<usize>,

    /// Only validate the input without inserting
    #[arg(long)]
    pub validate_only: bool,
}

/// Input document format. Documents without an id get one derived from their text.
#[derive(Debug, Deserialize)]
pub struct InputDocument {
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Handle the insert command.
pub async fn handle_insert(
    args: InsertArgs,
    config: &Config,
    pool: &BlockingPool,
    format: OutputFormat,
) -> Result<()> {
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let input = read_input(args.file.as_deref())?;
    let parsed = parse_input_documents(&input)?;
    let total = parsed.len() as u64;
    let documents = into_documents(parsed);
    let skipped = total - documents.len() as u64;

    if documents.is_empty() {
        print!("{}", formatter.format_message("No documents found in input."));
        return Ok(());
    }

    if args.validate_only {
        print!(
            "{}",
            formatter.format_message(&format!(
                "Validation successful: {} documents ready for insert ({} skipped)",
                documents.len(),
                skipped
            ))
        );
        return Ok(());
    }

    let collection = args
        .collection
        .unwrap_or_else(|| config.search.default_collection.clone());
    let batch_size = args.batch_size.unwrap_or(config.embedding.batch_size);
    let store = create_store(config, pool.clone()).context("failed to open vector store")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!(
        "embedding and storing {} documents into {}",
        documents.len(),
        collection
    ));

    let result = store.insert(&documents, &collection, batch_size).await;
    pb.finish_and_clear();
    result.context("insert failed")?;

    let stats = InsertStats {
        collection,
        documents: documents.len() as u64,
        skipped,
        duration_ms: start_time.elapsed().as_millis() as u64,
    };
    print!("{}", formatter.format_insert_stats(&stats));

    Ok(())
}

/// Read input from file or stdin.
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path.to_string_lossy() != "-" => {
            std::fs::read_to_string(path).context("failed to read file")
        }
        _ => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .context("failed to read stdin")?;
            Ok(input)
        }
    }
}

/// Parse input documents from a JSON array or JSONL.
fn parse_input_documents(input: &str) -> Result<Vec<InputDocument>, ImportError> {
    let input = input.trim();

    if input.is_empty() {
        return Ok(Vec::new());
    }

    if input.starts_with('[') {
        return Ok(serde_json::from_str(input)?);
    }

    let mut documents = Vec::new();
    for (i, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let doc: InputDocument = serde_json::from_str(line).map_err(|e| {
            ImportError::ValidationError(format!("line {}: {}", i + 1, e))
        })?;
        documents.push(doc);
    }

    Ok(documents)
}

/// Drop blank documents and fill in missing ids, keeping input order.
fn into_documents(parsed: Vec<InputDocument>) -> Vec<Document> {
    parsed
        .into_iter()
        .filter(|doc| !doc.text.trim().is_empty())
        .map(|doc| Document {
            id: doc.id.unwrap_or_else(|| Document::generate_id(&doc.text)),
            text: doc.text,
            metadata: doc.metadata,
        })
        .collect()
}
