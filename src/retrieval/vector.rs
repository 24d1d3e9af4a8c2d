use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::models::RetrievalResult;
use crate::ports::{RetrieveOptions, Retriever, TextEmbedder, VectorStore};
use crate::Result;

pub const SOURCE: &str = "vector";

/// Dense-vector similarity search over one collection.
#[derive(Clone)]
pub struct VectorRetriever {
    embedder: Arc<dyn TextEmbedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl VectorRetriever {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        options: &RetrieveOptions,
    ) -> Result<Vec<RetrievalResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;
        let mut results = self
            .store
            .search(
                &self.collection,
                &query_vector,
                limit,
                options.filter.as_ref(),
            )
            .await?;

        results.truncate(limit);
        for result in &mut results {
            result.source = SOURCE.to_string();
        }

        debug!(
            "Vector search in '{}' returned {} results",
            self.collection,
            results.len()
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{HashEmbedder, InMemoryVectorStore};
    use crate::models::{Chunk, ChunkType, QuantizationConfig};
    use crate::ports::SearchFilter;
    use crate::Error;

    async fn setup(texts: &[(&str, &str)]) -> VectorRetriever {
        let embedder = Arc::new(HashEmbedder::new(64));
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .create_collection("docs", embedder.dimension(), &QuantizationConfig::default())
            .await
            .unwrap();

        let chunks: Vec<Chunk> = texts
            .iter()
            .map(|(id, text)| {
                Chunk::with_id(*id, *text, ChunkType::Text, format!("doc-{id}"))
                    .with_embedding(embedder.embed_sync(text))
            })
            .collect();
        store.insert("docs", &chunks).await.unwrap();

        VectorRetriever::new(embedder, store, "docs")
    }

    #[tokio::test]
    async fn returns_most_similar_first() {
        let retriever = setup(&[
            ("cats", "cats purr and sleep"),
            ("rust", "rust borrow checker ownership"),
            ("boats", "boats float on water"),
        ])
        .await;

        // Same token multiset as "rust": cosine 1.0 whatever the bucket layout
        let results = retriever
            .retrieve("ownership checker borrow rust", 3, &RetrieveOptions::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk.id, "rust");
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|r| r.source == "vector"));
    }

    #[tokio::test]
    async fn empty_collection_yields_empty_list() {
        let retriever = setup(&[]).await;
        let results = retriever
            .retrieve("anything", 5, &RetrieveOptions::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn zero_limit_skips_collaborators() {
        let retriever = VectorRetriever::new(
            Arc::new(HashEmbedder::new(8)),
            Arc::new(InMemoryVectorStore::new()),
            "missing",
        );
        let results = retriever
            .retrieve("q", 0, &RetrieveOptions::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn missing_collection_is_not_found() {
        let retriever = VectorRetriever::new(
            Arc::new(HashEmbedder::new(8)),
            Arc::new(InMemoryVectorStore::new()),
            "missing",
        );
        let err = retriever
            .retrieve("q", 3, &RetrieveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn dimension_mismatch_is_invalid_query() {
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .create_collection("docs", 16, &QuantizationConfig::default())
            .await
            .unwrap();
        let retriever = VectorRetriever::new(Arc::new(HashEmbedder::new(32)), store, "docs");

        let err = retriever
            .retrieve("q", 3, &RetrieveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn filter_is_forwarded_to_store() {
        let retriever = setup(&[("a", "shared words"), ("b", "shared words")]).await;

        let options = RetrieveOptions::with_filter(SearchFilter::new().document("doc-b"));
        let results = retriever.retrieve("shared", 5, &options).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "b");
    }
}
