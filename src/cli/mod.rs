//! CLI module for ragstore.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Ingest documents into a vector store and search them.
#[derive(Debug, Parser)]
#[command(name = "ragstore")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'f', global = true, help = "Output format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check the embedding server and the vector store
    Status,

    /// Insert documents from a JSON/JSONL file
    Insert(commands::InsertArgs),

    /// Fetch documents by id
    Get(commands::GetArgs),

    /// Delete documents by id
    Delete(commands::DeleteArgs),

    /// Search a collection
    Search(commands::SearchArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
