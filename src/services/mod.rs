pub mod batch;
pub mod blocking;
pub mod embedding;
pub mod vector_store;

pub use batch::{Batch, to_batches};
pub use blocking::{BlockingPool, PendingTask};
pub use embedding::{
    Connector, EmbedRequest, EmbedTransport, HttpConnector, HttpSession, Vectorizer,
};
pub use vector_store::{
    Collection, GetResult, PendingDelete, QueryResult, SqliteBackend, SqliteCollection,
    StorageBackend, StoreDriver, VectorStore, create_store,
};
