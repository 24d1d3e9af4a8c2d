use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Chunk, QuantizationConfig, RetrievalResult};
use crate::Result;

/// Value a payload field must equal.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchValue {
    Keyword(String),
    Integer(i64),
    Bool(bool),
}

impl MatchValue {
    fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (MatchValue::Keyword(expected), Value::String(actual)) => expected == actual,
            (MatchValue::Integer(expected), Value::Number(actual)) => {
                actual.as_i64() == Some(*expected)
            }
            (MatchValue::Bool(expected), Value::Bool(actual)) => expected == actual,
            _ => false,
        }
    }
}

/// Single equality condition on a payload field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    pub key: String,
    pub value: MatchValue,
}

/// Filter for vector search. All conditions must hold.
///
/// Keys address chunk metadata plus the `source_document_id` and `chunk_type`
/// fields every stored chunk carries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub must: Vec<FieldMatch>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyword(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.must.push(FieldMatch {
            key: key.into(),
            value: MatchValue::Keyword(value.into()),
        });
        self
    }

    pub fn integer(mut self, key: impl Into<String>, value: i64) -> Self {
        self.must.push(FieldMatch {
            key: key.into(),
            value: MatchValue::Integer(value),
        });
        self
    }

    pub fn boolean(mut self, key: impl Into<String>, value: bool) -> Self {
        self.must.push(FieldMatch {
            key: key.into(),
            value: MatchValue::Bool(value),
        });
        self
    }

    /// Source document shortcut.
    pub fn document(self, source_document_id: impl Into<String>) -> Self {
        self.keyword("source_document_id", source_document_id)
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    /// Evaluate the filter against a chunk the way a payload index would.
    pub fn matches_chunk(&self, chunk: &Chunk) -> bool {
        self.must.iter().all(|condition| {
            let field = match condition.key.as_str() {
                "source_document_id" => Some(Value::String(chunk.source_document_id.clone())),
                "chunk_type" => Some(Value::String(chunk.chunk_type.as_str().to_string())),
                key => chunk.metadata.get(key).cloned(),
            };
            field.is_some_and(|value| condition.value.matches(&value))
        })
    }
}

/// Named, dimension-typed collections of chunk embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        quantization: &QuantizationConfig,
    ) -> Result<()>;

    /// Insert chunks as one batch. Every chunk must have an embedding; a
    /// chunk without one rejects the whole batch.
    async fn insert(&self, collection: &str, chunks: &[Chunk]) -> Result<()>;

    /// Nearest neighbours, highest similarity first.
    ///
    /// Fails with `NotFound` for a missing collection and `InvalidQuery` when
    /// the query vector length differs from the collection dimension.
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievalResult>>;

    async fn delete_collection(&self, name: &str) -> Result<()>;
}
