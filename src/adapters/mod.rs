//! Concrete implementations of the collaborator traits
//!
//! - Loading and chunking: [`TextLoader`], [`FixedSizeChunker`]
//! - Embedding: OpenAI, Ollama, Gemini and deterministic hash embedders
//! - Storage: Qdrant and Neo4j, plus in-memory stores for tests and offline runs
//! - Generation: Ollama and Gemini

pub mod chunker;
pub mod embeddings;
pub mod factory;
pub mod gemini;
pub mod memory_graph;
pub mod memory_store;
pub mod neo4j;
pub mod ollama;
pub mod qdrant;
mod stream;
pub mod text_loader;

pub use chunker::FixedSizeChunker;
pub use embeddings::{HashEmbedder, HashTokenEmbedder, OpenAIEmbedder};
pub use factory::AdapterFactory;
pub use gemini::{GeminiEmbedder, GeminiGenerator};
pub use memory_graph::InMemoryGraphStore;
pub use memory_store::InMemoryVectorStore;
pub use neo4j::Neo4jGraphStore;
pub use ollama::{OllamaEmbedder, OllamaGenerator};
pub use qdrant::QdrantStore;
pub use text_loader::TextLoader;
