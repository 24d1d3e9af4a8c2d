//! In-process vector store with exact cosine search.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{Chunk, QuantizationConfig, RetrievalResult};
use crate::ports::{SearchFilter, VectorStore};
use crate::{Error, Result};

#[derive(Debug)]
struct Collection {
    dimension: usize,
    points: Vec<Chunk>,
}

/// Brute-force vector store kept in memory.
///
/// Quantization settings are accepted and ignored; scores are exact cosine
/// similarities. Inserting a chunk id twice replaces the earlier point.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points in a collection, `None` when it does not exist.
    pub async fn len(&self, collection: &str) -> Option<usize> {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.len())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        _quantization: &QuantizationConfig,
    ) -> Result<()> {
        if dimension == 0 {
            return Err(Error::InvalidConfig(
                "collection dimension must be positive".to_string(),
            ));
        }

        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_insert_with(|| {
            debug!("Creating in-memory collection '{}' (dim={})", name, dimension);
            Collection {
                dimension,
                points: Vec::new(),
            }
        });
        Ok(())
    }

    async fn insert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| Error::NotFound(format!("collection {}", collection)))?;

        for chunk in chunks {
            match &chunk.embedding {
                None => {
                    return Err(Error::InvalidQuery(format!(
                        "chunk {} has no embedding",
                        chunk.id
                    )))
                }
                Some(e) if e.len() != target.dimension => {
                    return Err(Error::InvalidQuery(format!(
                        "chunk {} has dimension {}, collection expects {}",
                        chunk.id,
                        e.len(),
                        target.dimension
                    )))
                }
                Some(_) => {}
            }
        }

        for chunk in chunks {
            match target.points.iter_mut().find(|p| p.id == chunk.id) {
                Some(existing) => *existing = chunk.clone(),
                None => target.points.push(chunk.clone()),
            }
        }

        debug!("Inserted {} chunks into '{}'", chunks.len(), collection);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| Error::NotFound(format!("collection {}", collection)))?;

        if query_vector.len() != target.dimension {
            return Err(Error::InvalidQuery(format!(
                "query has dimension {}, collection expects {}",
                query_vector.len(),
                target.dimension
            )));
        }

        let mut scored: Vec<(f64, &Chunk)> = target
            .points
            .iter()
            .filter(|chunk| filter.map_or(true, |f| f.matches_chunk(chunk)))
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_deref()?;
                Some((cosine_similarity(query_vector, embedding) as f64, chunk))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(score, chunk)| {
                let mut chunk = chunk.clone();
                chunk.embedding = None;
                RetrievalResult::new(chunk, score, "vector")
            })
            .collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("collection {}", name)))
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkType, Metadata};
    use serde_json::json;

    fn point(id: &str, doc: &str, embedding: Vec<f32>) -> Chunk {
        Chunk::with_id(id, format!("content {id}"), ChunkType::Text, doc).with_embedding(embedding)
    }

    async fn store_with(points: &[Chunk]) -> InMemoryVectorStore {
        let store = InMemoryVectorStore::new();
        store
            .create_collection("docs", 2, &QuantizationConfig::default())
            .await
            .unwrap();
        store.insert("docs", points).await.unwrap();
        store
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let store = store_with(&[
            point("far", "d", vec![0.0, 1.0]),
            point("near", "d", vec![1.0, 0.1]),
            point("mid", "d", vec![1.0, 1.0]),
        ])
        .await;

        let results = store.search("docs", &[1.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(results[0].score >= results[1].score);
        assert!(results.iter().all(|r| r.source == "vector"));
        assert!(results.iter().all(|r| r.chunk.embedding.is_none()));
    }

    #[tokio::test]
    async fn equal_scores_keep_insertion_order() {
        let store = store_with(&[
            point("a", "d", vec![1.0, 0.0]),
            point("b", "d", vec![2.0, 0.0]),
        ])
        .await;

        let results = store.search("docs", &[1.0, 0.0], 5, None).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn search_applies_filter() {
        let mut tagged = point("tagged", "d1", vec![0.0, 1.0]);
        let mut metadata = Metadata::new();
        metadata.insert("lang".into(), json!("rust"));
        tagged.metadata = metadata;

        let store = store_with(&[point("other", "d2", vec![1.0, 0.0]), tagged]).await;

        let filter = SearchFilter::new().keyword("lang", "rust");
        let results = store
            .search("docs", &[1.0, 0.0], 5, Some(&filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "tagged");

        let by_doc = SearchFilter::new().document("d2");
        let results = store
            .search("docs", &[1.0, 0.0], 5, Some(&by_doc))
            .await
            .unwrap();
        assert_eq!(results[0].chunk.id, "other");
    }

    #[tokio::test]
    async fn missing_collection_is_not_found() {
        let store = InMemoryVectorStore::new();
        let err = store.search("nope", &[1.0], 1, None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = store.delete_collection("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_invalid_query() {
        let store = store_with(&[]).await;
        let err = store.search("docs", &[1.0, 0.0, 0.0], 1, None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn insert_rejects_whole_batch_on_missing_embedding() {
        let store = store_with(&[]).await;
        let batch = vec![
            point("ok", "d", vec![1.0, 0.0]),
            Chunk::with_id("bare", "no vector", ChunkType::Text, "d"),
        ];

        let err = store.insert("docs", &batch).await.unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
        assert_eq!(store.len("docs").await, Some(0));
    }

    #[tokio::test]
    async fn insert_replaces_existing_id() {
        let store = store_with(&[point("a", "d", vec![1.0, 0.0])]).await;
        store
            .insert("docs", &[point("a", "d2", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.len("docs").await, Some(1));
        let results = store.search("docs", &[0.0, 1.0], 1, None).await.unwrap();
        assert_eq!(results[0].chunk.source_document_id, "d2");
    }

    #[tokio::test]
    async fn create_collection_is_idempotent() {
        let store = store_with(&[point("a", "d", vec![1.0, 0.0])]).await;
        store
            .create_collection("docs", 2, &QuantizationConfig::default())
            .await
            .unwrap();
        assert_eq!(store.len("docs").await, Some(1));
    }

    #[tokio::test]
    async fn empty_collection_returns_empty_list() {
        let store = store_with(&[]).await;
        let results = store.search("docs", &[1.0, 0.0], 3, None).await.unwrap();
        assert!(results.is_empty());
    }
}
