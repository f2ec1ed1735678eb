use crate::models::{Document, Metadata};

/// A slice of documents laid out as parallel columns.
///
/// Index `i` of `ids`, `texts` and `metadatas` always describes the same
/// document; the columns are only ever grown together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    ids: Vec<String>,
    texts: Vec<String>,
    metadatas: Vec<Metadata>,
}

impl Batch {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            texts: Vec::with_capacity(capacity),
            metadatas: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, document: &Document) {
        self.ids.push(document.id.clone());
        self.texts.push(document.text.clone());
        self.metadatas.push(document.metadata.clone());
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn metadatas(&self) -> &[Metadata] {
        &self.metadatas
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Split `documents` into consecutive batches of at most `batch_size`.
/// A `batch_size` of zero is treated as one.
pub fn to_batches(documents: &[Document], batch_size: usize) -> Vec<Batch> {
    documents
        .chunks(batch_size.max(1))
        .map(|chunk| {
            let mut batch = Batch::with_capacity(chunk.len());
            for document in chunk {
                batch.push(document);
            }
            batch
        })
        .collect()
}
