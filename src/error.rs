//! Error types for the retrieval engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing collection, node or file.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Mismatched weights/strategies, bad chunking parameters, unknown provider.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Query the collaborator cannot answer, e.g. an embedding dimension mismatch.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Network or service error reported by an external collaborator.
    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    /// One document among many failed to load. Non-fatal during directory ingestion.
    #[error("Failed to load {path}: {reason}")]
    PartialLoadFailure { path: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors the orchestrator may log and skip.
    pub fn is_partial(&self) -> bool {
        matches!(self, Error::PartialLoadFailure { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::UpstreamFailure(err.to_string())
    }
}

impl From<async_openai::error::OpenAIError> for Error {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        Error::UpstreamFailure(format!("OpenAI: {}", err))
    }
}

impl From<neo4rs::Error> for Error {
    fn from(err: neo4rs::Error) -> Self {
        Error::UpstreamFailure(format!("Neo4j: {}", err))
    }
}

impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        classify_store_message(&err.to_string())
    }
}

/// Qdrant reports missing collections and dimension mismatches only through
/// the status message, so both are recognised here.
pub(crate) fn classify_store_message(message: &str) -> Error {
    let lower = message.to_lowercase();
    if lower.contains("doesn't exist") || lower.contains("not found") {
        Error::NotFound(message.to_string())
    } else if lower.contains("dimension") {
        Error::InvalidQuery(message.to_string())
    } else {
        Error::UpstreamFailure(message.to_string())
    }
}
