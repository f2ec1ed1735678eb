pub mod cli;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::{EmbeddingError, VectorStoreError};
pub use models::{Config, Document, OutputFormat, SearchResult};
pub use services::{BlockingPool, StoreDriver, VectorStore};
