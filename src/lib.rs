//! PolyRAG - multi-strategy retrieval and fusion for RAG pipelines
//!
//! This library provides tools to:
//! - Ingest files into a vector store (load -> chunk -> embed -> store)
//! - Retrieve chunks by dense-vector similarity
//! - Rerank candidates with token-level late interaction (MaxSim)
//! - Expand graph matches into textual context from a graph database
//! - Fuse several strategies into one ranked list with weighted scores
//! - Answer questions through an LLM using the retrieved context

pub mod adapters;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod ports;
pub mod prompts;
pub mod retrieval;

// Re-export common types
pub use config::Config;
pub use error::{Error, Result};
pub use models::{
    Chunk, ChunkType, Document, Element, ElementType, Metadata, QuantizationConfig,
    QuantizationType, RetrievalResult,
};
pub use pipeline::{IngestReport, Pipeline, PipelineBuilder};
pub use prompts::PromptTemplate;
pub use retrieval::{GraphRetriever, HybridRetriever, LateInteractionRetriever, VectorRetriever};
