use serde_json::json;

use crate::models::{Chunk, ChunkType, Document, Metadata};
use crate::ports::Chunker;
use crate::{Error, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// Character-window chunker with overlap.
///
/// Every textual element (text, table, code) is split on its own; image
/// elements produce no chunks.
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    size: usize,
    overlap: usize,
}

impl Default for FixedSizeChunker {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl FixedSizeChunker {
    /// Create a new chunker. `overlap` must be smaller than `size`.
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if overlap >= size {
            return Err(Error::InvalidConfig(format!(
                "chunk overlap ({}) must be less than chunk size ({})",
                overlap, size
            )));
        }

        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into overlapping windows of at most `size` characters.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let step = self.size - self.overlap;
        let mut windows = Vec::new();
        let mut start = 0;

        loop {
            let end = (start + self.size).min(chars.len());
            windows.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        windows
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let mut chunks = Vec::new();

        for element in document
            .elements
            .iter()
            .filter(|e| e.element_type.is_textual())
        {
            let pieces = self.split_text(&element.content);
            let total = pieces.len();

            for (index, piece) in pieces.into_iter().enumerate() {
                let mut metadata = Metadata::new();
                metadata.insert("chunk_index".into(), json!(index));
                metadata.insert("total_chunks".into(), json!(total));
                metadata.insert("element_type".into(), json!(element.element_type.as_str()));
                metadata.extend(element.metadata.clone());
                metadata.extend(document.metadata.clone());

                chunks.push(
                    Chunk::new(piece, ChunkType::Text, document.id.clone()).with_metadata(metadata),
                );
            }
        }

        chunks
    }
}
