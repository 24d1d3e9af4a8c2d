//! Value types shared by loaders, chunkers, stores and retrievers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// String-keyed metadata with arbitrary JSON values.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Kind of content held by an [`Element`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Text,
    Table,
    Image,
    Code,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Text => "text",
            ElementType::Table => "table",
            ElementType::Image => "image",
            ElementType::Code => "code",
        }
    }

    /// Whether the content is text that can be split and embedded as such.
    pub fn is_textual(&self) -> bool {
        !matches!(self, ElementType::Image)
    }
}

/// Typed content unit owned by a [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Text, or an image reference (path / URI) for images
    pub content: String,
    pub element_type: ElementType,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Element {
    pub fn new(content: impl Into<String>, element_type: ElementType) -> Self {
        Self {
            content: content.into(),
            element_type,
            metadata: Metadata::new(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(content, ElementType::Text)
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Source document produced by a loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub elements: Vec<Element>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(elements: Vec<Element>, metadata: Metadata) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            elements,
            metadata,
        }
    }

    /// Concatenated content of all text elements, newline separated.
    pub fn text_content(&self) -> String {
        self.elements
            .iter()
            .filter(|e| e.element_type == ElementType::Text)
            .map(|e| e.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Kind of content held by a [`Chunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Text,
    Image,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Text => "text",
            ChunkType::Image => "image",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "image" => ChunkType::Image,
            _ => ChunkType::Text,
        }
    }
}

/// Indexable unit derived from a document.
///
/// The `id` is the identity every retrieval strategy reports back, so it must
/// stay unchanged from chunking through storage and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Text, or an image reference for image chunks
    pub content: String,
    pub chunk_type: ChunkType,
    pub source_document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(
        content: impl Into<String>,
        chunk_type: ChunkType,
        source_document_id: impl Into<String>,
    ) -> Self {
        Self::with_id(
            Uuid::new_v4().to_string(),
            content,
            chunk_type,
            source_document_id,
        )
    }

    pub fn with_id(
        id: impl Into<String>,
        content: impl Into<String>,
        chunk_type: ChunkType,
        source_document_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            chunk_type,
            source_document_id: source_document_id.into(),
            embedding: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Scored chunk returned by a retrieval strategy.
///
/// Scores are on the producing strategy's own scale; `source` names the
/// strategy. Fusion builds new values instead of editing existing ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f64,
    pub source: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RetrievalResult {
    pub fn new(chunk: Chunk, score: f64, source: impl Into<String>) -> Self {
        Self {
            chunk,
            score,
            source: source.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Vector quantization mode requested at collection creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantizationType {
    #[default]
    None,
    Binary,
    Product,
}

/// Declarative quantization settings handed to the vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizationConfig {
    #[serde(rename = "type")]
    pub kind: QuantizationType,
    pub always_ram: bool,
    pub rescore: bool,
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self {
            kind: QuantizationType::None,
            always_ram: false,
            rescore: true,
        }
    }
}
