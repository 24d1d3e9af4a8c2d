//! Collaborator contracts consumed by the retrieval engine
//!
//! Every external service (embedding model, vector index, graph database,
//! document loader, chunker, language model) sits behind one of these traits.
//! Retrieval strategies hold `Arc<dyn Trait>` handles and never depend on a
//! concrete adapter.

pub mod chunking;
pub mod embedding;
pub mod graph_store;
pub mod llm;
pub mod loader;
pub mod retriever;
pub mod vector_store;

pub use chunking::Chunker;
pub use embedding::{TextEmbedder, TokenEmbedder, TokenMatrix};
pub use graph_store::{GraphNode, GraphRelationship, GraphStore, Record, Subgraph};
pub use llm::{Generator, TextStream};
pub use loader::DocumentLoader;
pub use retriever::{RetrieveOptions, Retriever};
pub use vector_store::{FieldMatch, MatchValue, SearchFilter, VectorStore};
