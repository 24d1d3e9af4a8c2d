use crate::models::{Chunk, Document};

/// Splits a document into indexable chunks.
///
/// Every returned chunk must carry a fresh, unique id and the document's id as
/// `source_document_id`.
pub trait Chunker: Send + Sync {
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}
