//! SQLite storage backend with brute-force L2 search.

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Collection, GetResult, QueryResult, StorageBackend};
use crate::error::VectorStoreError;
use crate::models::{Embedding, Metadata, MetadataValue};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS records (
    collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    id TEXT NOT NULL,
    document TEXT NOT NULL,
    metadata TEXT NOT NULL,
    embedding BLOB NOT NULL,
    PRIMARY KEY (collection, id)
);
"#;

type Shared = Arc<Mutex<Connection>>;

fn lock(conn: &Shared) -> Result<MutexGuard<'_, Connection>, VectorStoreError> {
    conn.lock()
        .map_err(|_| VectorStoreError::Backend("connection mutex poisoned".to_string()))
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Result<Embedding, VectorStoreError> {
    if bytes.len() % 4 != 0 {
        return Err(VectorStoreError::CorruptRecord(format!(
            "embedding blob of {} bytes is not a whole number of f32 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn encode_metadata(metadata: &Metadata) -> Result<String, VectorStoreError> {
    for (key, value) in metadata {
        if let MetadataValue::Float(x) = value
            && !x.is_finite()
        {
            return Err(VectorStoreError::InvalidInput(format!(
                "metadata value for {key} is not finite: {x}"
            )));
        }
    }
    serde_json::to_string(metadata).map_err(|e| VectorStoreError::InvalidInput(e.to_string()))
}

fn decode_metadata(json: &str) -> Result<Metadata, VectorStoreError> {
    serde_json::from_str(json).map_err(|e| VectorStoreError::CorruptRecord(e.to_string()))
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// SQLite database holding any number of collections.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    conn: Shared,
}

impl SqliteBackend {
    /// Open (or create) a database file. `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: &Path) -> Result<Self, VectorStoreError> {
        if path.as_os_str() == ":memory:" {
            return Self::in_memory();
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| VectorStoreError::Backend(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, VectorStoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, VectorStoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl StorageBackend for SqliteBackend {
    type Collection = SqliteCollection;

    fn get_or_create_collection(&self, name: &str) -> Result<SqliteCollection, VectorStoreError> {
        if name.trim().is_empty() {
            return Err(VectorStoreError::InvalidInput(
                "collection name cannot be empty".to_string(),
            ));
        }
        lock(&self.conn)?
            .execute(
                "INSERT OR IGNORE INTO collections (name) VALUES (?1)",
                params![name],
            )
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        Ok(SqliteCollection {
            conn: Arc::clone(&self.conn),
            name: name.to_string(),
        })
    }

    fn list_collections(&self) -> Result<Vec<String>, VectorStoreError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn health_check(&self) -> Result<(), VectorStoreError> {
        lock(&self.conn)?.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

/// Handle to one collection inside a `SqliteBackend`.
#[derive(Debug, Clone)]
pub struct SqliteCollection {
    conn: Shared,
    name: String,
}

impl Collection for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn upsert(
        &self,
        ids: &[String],
        embeddings: &[Embedding],
        metadatas: &[Metadata],
        documents: &[String],
    ) -> Result<(), VectorStoreError> {
        if embeddings.len() != ids.len()
            || metadatas.len() != ids.len()
            || documents.len() != ids.len()
        {
            return Err(VectorStoreError::InvalidInput(format!(
                "upsert columns differ in length: ids={}, embeddings={}, metadatas={}, documents={}",
                ids.len(),
                embeddings.len(),
                metadatas.len(),
                documents.len()
            )));
        }

        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO records (collection, id, document, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (collection, id) DO UPDATE SET
                     document = excluded.document,
                     metadata = excluded.metadata,
                     embedding = excluded.embedding",
            )?;
            for (((id, embedding), metadata), document) in
                ids.iter().zip(embeddings).zip(metadatas).zip(documents)
            {
                stmt.execute(params![
                    self.name,
                    id,
                    document,
                    encode_metadata(metadata)?,
                    encode_embedding(embedding)
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, ids: &[String]) -> Result<(), VectorStoreError> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare_cached("DELETE FROM records WHERE collection = ?1 AND id = ?2")?;
            for id in ids {
                stmt.execute(params![self.name, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get(&self, ids: &[String]) -> Result<GetResult, VectorStoreError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare_cached(
            "SELECT document, metadata FROM records WHERE collection = ?1 AND id = ?2",
        )?;

        let mut result = GetResult::default();
        for id in ids {
            let row = stmt
                .query_row(params![self.name, id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .optional()?;
            if let Some((document, metadata)) = row {
                result.ids.push(id.clone());
                result.documents.push(document);
                result.metadatas.push(decode_metadata(&metadata)?);
            }
        }
        Ok(result)
    }

    fn query(
        &self,
        query_embeddings: &[Embedding],
        n_results: usize,
    ) -> Result<QueryResult, VectorStoreError> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, document, metadata, embedding FROM records WHERE collection = ?1",
        )?;
        let rows = stmt
            .query_map(params![self.name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(id, document, metadata, blob)| {
                Ok((id, document, metadata, decode_embedding(&blob)?))
            })
            .collect::<Result<Vec<_>, VectorStoreError>>()?;

        let mut result = QueryResult::default();
        for query in query_embeddings {
            let mut scored: Vec<(f32, usize)> = rows
                .iter()
                .enumerate()
                .filter(|(_, (_, _, _, embedding))| embedding.len() == query.len())
                .map(|(i, (_, _, _, embedding))| (squared_l2(query, embedding), i))
                .collect();
            scored.sort_by(|a, b| a.0.total_cmp(&b.0));
            scored.truncate(n_results);

            let mut ids = Vec::with_capacity(scored.len());
            let mut documents = Vec::with_capacity(scored.len());
            let mut metadatas = Vec::with_capacity(scored.len());
            let mut distances = Vec::with_capacity(scored.len());
            for (distance, i) in scored {
                let (id, document, metadata, _) = &rows[i];
                ids.push(id.clone());
                documents.push(document.clone());
                metadatas.push(decode_metadata(metadata)?);
                distances.push(distance);
            }
            result.ids.push(ids);
            result.documents.push(documents);
            result.metadatas.push(metadatas);
            result.distances.push(distances);
        }
        Ok(result)
    }

    fn count(&self) -> Result<usize, VectorStoreError> {
        let count: i64 = lock(&self.conn)?.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
