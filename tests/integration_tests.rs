//! Integration tests for the polyrag library
//!
//! These tests verify the public API and how the retrieval strategies compose.

use std::sync::Arc;

use serde_json::json;

use polyrag::adapters::{
    AdapterFactory, HashEmbedder, HashTokenEmbedder, InMemoryGraphStore, InMemoryVectorStore,
};
use polyrag::config::{Config, StrategyKind};
use polyrag::ports::{GraphStore, RetrieveOptions, Retriever, TextEmbedder, VectorStore};
use polyrag::retrieval::{maxsim, GraphRetrieverOptions};
use polyrag::{
    Chunk, ChunkType, Error, GraphRetriever, HybridRetriever, LateInteractionRetriever, Metadata,
    QuantizationConfig, VectorRetriever,
};

const DIM: usize = 1024;

async fn vector_store(texts: &[(&str, &str)]) -> Arc<InMemoryVectorStore> {
    let embedder = HashEmbedder::new(DIM);
    let store = Arc::new(InMemoryVectorStore::new());
    store
        .create_collection("kb", DIM, &QuantizationConfig::default())
        .await
        .unwrap();

    let chunks: Vec<Chunk> = texts
        .iter()
        .map(|(id, text)| {
            Chunk::with_id(*id, *text, ChunkType::Text, "kb-doc")
                .with_embedding(embedder.embed_sync(text))
        })
        .collect();
    store.insert("kb", &chunks).await.unwrap();
    store
}

fn node(id: &str, content: &str) -> Metadata {
    let mut props = Metadata::new();
    props.insert("id".into(), json!(id));
    props.insert("content".into(), json!(content));
    props
}

// ============================================================================
// Retrieval
// ============================================================================

#[test]
fn test_maxsim_reference_value() {
    let score = maxsim(&[vec![1.0, 0.0]], &[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    assert!((score - 1.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_vector_retrieval_on_empty_collection() {
    let store = vector_store(&[]).await;
    let retriever = VectorRetriever::new(Arc::new(HashEmbedder::new(DIM)), store, "kb");

    let results = retriever
        .retrieve("anything", 5, &RetrieveOptions::default())
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_late_interaction_over_vector_candidates() {
    let store = vector_store(&[
        ("tokio", "tokio runtime schedules async tasks"),
        ("serde", "serde derives serialize for structs"),
        ("mixed", "tokio and serde together"),
    ])
    .await;
    let vector = Arc::new(VectorRetriever::new(
        Arc::new(HashEmbedder::new(DIM)),
        store,
        "kb",
    ));
    let late = LateInteractionRetriever::new(vector, Arc::new(HashTokenEmbedder::new(DIM)));

    let results = late
        .retrieve("tokio runtime", 2, &RetrieveOptions::default())
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.id, "tokio");
    assert!(results[0].score >= results[1].score);
    for result in &results {
        assert_eq!(result.source, "late_interaction");
        assert!(result.metadata.contains_key("original_score"));
        assert!(result.metadata.contains_key("maxsim_score"));
    }
}

#[tokio::test]
async fn test_graph_context_synthesis_order() {
    let graph = Arc::new(InMemoryGraphStore::new());
    graph
        .add_node("Chunk", node("c1", "Qdrant quantization modes"))
        .await
        .unwrap();
    graph
        .add_node("Chunk", node("c2", "Binary quantization keeps one bit"))
        .await
        .unwrap();
    graph
        .add_edge("c1", "c2", "RELATED_TO", Metadata::new())
        .await
        .unwrap();

    let retriever = GraphRetriever::with_options(graph, GraphRetrieverOptions::default());
    let results = retriever
        .retrieve("qdrant", 3, &RetrieveOptions::default())
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].chunk.content,
        "Main: Qdrant quantization modes\nRelated: Binary quantization keeps one bit\n[RELATED_TO]"
    );
}

#[tokio::test]
async fn test_hybrid_fuses_vector_and_graph() {
    let store = vector_store(&[
        ("c1", "qdrant quantization modes"),
        ("v2", "qdrant collections and payloads"),
    ])
    .await;
    let graph = Arc::new(InMemoryGraphStore::new());
    graph
        .add_node("Chunk", node("c1", "qdrant quantization modes"))
        .await
        .unwrap();

    let vector: Arc<dyn Retriever> = Arc::new(VectorRetriever::new(
        Arc::new(HashEmbedder::new(DIM)),
        store,
        "kb",
    ));
    let graph: Arc<dyn Retriever> = Arc::new(GraphRetriever::new(graph));
    let hybrid = HybridRetriever::new(vec![vector, graph], Some(vec![1.0, 1.0])).unwrap();

    let results = hybrid
        .retrieve("qdrant quantization", 5, &RetrieveOptions::default())
        .await
        .unwrap();

    // c1 is found by both strategies
    assert_eq!(results[0].chunk.id, "c1");
    assert!(results[0].metadata.contains_key("vector_score"));
    assert_eq!(results[0].metadata["graph_score"], json!(1.0));
    let expected = 0.5 * results[0].metadata["vector_score"].as_f64().unwrap() + 0.5;
    assert!((results[0].score - expected).abs() < 1e-9);
    assert!(results.iter().all(|r| r.source == "hybrid"));
}

#[test]
fn test_hybrid_weight_mismatch() {
    let vector: Arc<dyn Retriever> = Arc::new(VectorRetriever::new(
        Arc::new(HashEmbedder::new(DIM)),
        Arc::new(InMemoryVectorStore::new()),
        "kb",
    ));
    let err = HybridRetriever::new(vec![vector], Some(vec![0.5, 0.5])).err();
    assert!(matches!(err, Some(Error::InvalidConfig(_))));
}

// ============================================================================
// Config + factory
// ============================================================================

#[test]
fn test_config_drives_offline_adapters() {
    let config = Config::from_yaml_str(
        r#"
retrieval:
  strategy: hybrid
  hybrid_strategies: [vector, graph]
  weights: [0.7, 0.3]
vector_store:
  provider: memory
graph_store:
  provider: memory
embedding:
  provider: hash
  dimension: 64
"#,
    )
    .unwrap();

    assert_eq!(config.retrieval.strategy, StrategyKind::Hybrid);
    assert_eq!(
        config.retrieval.hybrid_strategies,
        vec![StrategyKind::Vector, StrategyKind::Graph]
    );

    let embedder = AdapterFactory::create_embedding(&config.embedding).unwrap();
    assert_eq!(embedder.dimension(), 64);
    assert!(AdapterFactory::create_vector_store(&config.vector_store).is_ok());
}

#[tokio::test]
async fn test_factory_builds_memory_graph_store() {
    let config = Config::from_yaml_str("graph_store:\n  provider: memory\n").unwrap();
    let graph = AdapterFactory::create_graph_store(&config.graph_store)
        .await
        .unwrap();
    let id = graph.add_node("Chunk", node("n1", "hello")).await.unwrap();
    assert_eq!(id, "n1");
}
