//! Builds adapters from provider names in configuration.

use std::sync::Arc;

use tracing::info;

use super::chunker::FixedSizeChunker;
use super::embeddings::{HashEmbedder, HashTokenEmbedder, OpenAIEmbedder};
use super::gemini::{GeminiEmbedder, GeminiGenerator};
use super::memory_graph::InMemoryGraphStore;
use super::memory_store::InMemoryVectorStore;
use super::neo4j::Neo4jGraphStore;
use super::ollama::{OllamaEmbedder, OllamaGenerator};
use super::qdrant::QdrantStore;
use super::text_loader::TextLoader;
use crate::config::{
    ChunkingConfig, EmbeddingConfig, GraphStoreConfig, LlmConfig, VectorStoreConfig,
};
use crate::ports::{
    Chunker, DocumentLoader, Generator, GraphStore, TextEmbedder, TokenEmbedder, VectorStore,
};
use crate::{Error, Result};

pub struct AdapterFactory;

fn unknown(kind: &str, provider: &str) -> Error {
    Error::InvalidConfig(format!("Unknown {} provider: {}", kind, provider))
}

impl AdapterFactory {
    pub fn create_llm(config: &LlmConfig) -> Result<Arc<dyn Generator>> {
        match config.provider.to_lowercase().as_str() {
            "ollama" => Ok(Arc::new(OllamaGenerator::with_url(
                &config.url,
                config.model.clone(),
            )?)),
            "gemini" => Ok(Arc::new(GeminiGenerator::with_url(
                &config.url,
                config.api_key.clone(),
                config.model.clone(),
            )?)),
            other => Err(unknown("LLM", other)),
        }
    }

    pub fn create_embedding(config: &EmbeddingConfig) -> Result<Arc<dyn TextEmbedder>> {
        match config.provider.to_lowercase().as_str() {
            "ollama" => Ok(Arc::new(OllamaEmbedder::with_url(
                &config.url,
                config.model.clone(),
                config.dimension,
            )?)),
            "openai" => {
                let embedder = match &config.api_key {
                    Some(key) => OpenAIEmbedder::with_api_key(key.clone(), config.model.clone())?,
                    None => OpenAIEmbedder::with_model(config.model.clone())?,
                };
                Ok(Arc::new(embedder))
            }
            "gemini" => Ok(Arc::new(GeminiEmbedder::with_url(
                &config.url,
                config.api_key.clone(),
                config.model.clone(),
                config.dimension,
            )?)),
            "hash" => Ok(Arc::new(HashEmbedder::new(config.dimension))),
            other => Err(unknown("embedding", other)),
        }
    }

    pub fn create_token_embedding(config: &EmbeddingConfig) -> Arc<dyn TokenEmbedder> {
        Arc::new(HashTokenEmbedder::new(config.token_dimension))
    }

    pub fn create_vector_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>> {
        match config.provider.to_lowercase().as_str() {
            "qdrant" => {
                info!("Using Qdrant at {}", config.url);
                Ok(Arc::new(QdrantStore::new(&config.url)?))
            }
            "memory" => Ok(Arc::new(InMemoryVectorStore::new())),
            other => Err(unknown("vector store", other)),
        }
    }

    pub async fn create_graph_store(config: &GraphStoreConfig) -> Result<Arc<dyn GraphStore>> {
        match config.provider.to_lowercase().as_str() {
            "neo4j" => Ok(Arc::new(
                Neo4jGraphStore::new(&config.uri, &config.user, &config.password).await?,
            )),
            "memory" => Ok(Arc::new(InMemoryGraphStore::new())),
            other => Err(unknown("graph store", other)),
        }
    }

    pub fn create_document_loader(loader_type: &str) -> Result<Arc<dyn DocumentLoader>> {
        match loader_type.to_lowercase().as_str() {
            "text" => Ok(Arc::new(TextLoader::new())),
            other => Err(unknown("document loader", other)),
        }
    }

    pub fn create_chunker(config: &ChunkingConfig) -> Result<Arc<dyn Chunker>> {
        Ok(Arc::new(FixedSizeChunker::new(config.size, config.overlap)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_providers_are_invalid_config() {
        let llm = LlmConfig {
            provider: "claude".into(),
            ..Default::default()
        };
        assert!(matches!(
            AdapterFactory::create_llm(&llm),
            Err(Error::InvalidConfig(_))
        ));

        let embedding = EmbeddingConfig {
            provider: "fastembed".into(),
            ..Default::default()
        };
        assert!(matches!(
            AdapterFactory::create_embedding(&embedding),
            Err(Error::InvalidConfig(_))
        ));

        let store = VectorStoreConfig {
            provider: "pinecone".into(),
            ..Default::default()
        };
        assert!(matches!(
            AdapterFactory::create_vector_store(&store),
            Err(Error::InvalidConfig(_))
        ));

        assert!(matches!(
            AdapterFactory::create_document_loader("pdf"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn unknown_graph_provider_is_invalid_config() {
        let config = GraphStoreConfig {
            provider: "arangodb".into(),
            ..Default::default()
        };
        assert!(matches!(
            AdapterFactory::create_graph_store(&config).await,
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn memory_providers_build_offline() {
        let store = AdapterFactory::create_vector_store(&VectorStoreConfig {
            provider: "memory".into(),
            ..Default::default()
        })
        .unwrap();
        store
            .create_collection("c", 4, &Default::default())
            .await
            .unwrap();

        let graph = AdapterFactory::create_graph_store(&GraphStoreConfig {
            provider: "Memory".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        assert!(graph.get_subgraph("x", 1).await.unwrap().is_empty());
    }

    #[test]
    fn hash_embedding_uses_configured_dimension() {
        let config = EmbeddingConfig {
            provider: "hash".into(),
            dimension: 64,
            ..Default::default()
        };
        let embedder = AdapterFactory::create_embedding(&config).unwrap();
        assert_eq!(embedder.dimension(), 64);
    }

    #[test]
    fn gemini_providers_build_with_explicit_key() {
        let llm = LlmConfig {
            provider: "gemini".into(),
            model: "gemini-2.5-flash".into(),
            url: "http://localhost:1".into(),
            api_key: Some("k".into()),
        };
        let generator = AdapterFactory::create_llm(&llm).unwrap();
        assert_eq!(generator.model_name(), "gemini-2.5-flash");

        let embedding = EmbeddingConfig {
            provider: "Gemini".into(),
            model: "text-embedding-004".into(),
            dimension: 768,
            api_key: Some("k".into()),
            ..Default::default()
        };
        let embedder = AdapterFactory::create_embedding(&embedding).unwrap();
        assert_eq!(embedder.dimension(), 768);

        let blank = LlmConfig {
            api_key: Some(" ".into()),
            ..llm
        };
        assert!(matches!(
            AdapterFactory::create_llm(&blank),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn chunker_validates_overlap() {
        let bad = ChunkingConfig {
            size: 10,
            overlap: 12,
        };
        assert!(AdapterFactory::create_chunker(&bad).is_err());
        assert!(AdapterFactory::create_chunker(&ChunkingConfig::default()).is_ok());
    }

    #[test]
    fn ollama_llm_builds_without_server() {
        let llm = AdapterFactory::create_llm(&LlmConfig::default()).unwrap();
        assert_eq!(llm.model_name(), "llama3.2");
    }
}
