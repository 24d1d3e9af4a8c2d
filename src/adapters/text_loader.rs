use std::path::Path;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::models::{Document, Element, Metadata};
use crate::ports::DocumentLoader;
use crate::{Error, Result};

const EXTENSIONS: &[&str] = &[".txt", ".md"];

/// Loads UTF-8 plain text and Markdown files as a single text element.
#[derive(Debug, Clone, Default)]
pub struct TextLoader;

impl TextLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentLoader for TextLoader {
    async fn load(&self, path: &Path) -> Result<Document> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(Error::NotFound(format!("file {}", path.display())));
        }

        if !self.supports(path) {
            return Err(Error::InvalidConfig(format!(
                "unsupported file extension: {}",
                path.display()
            )));
        }

        let content = tokio::fs::read_to_string(path).await?;
        let source = path.display().to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut element_meta = Metadata::new();
        element_meta.insert("source_file".into(), json!(source));

        let mut metadata = Metadata::new();
        metadata.insert("source_file".into(), json!(source));
        metadata.insert("file_name".into(), json!(file_name));
        metadata.insert("file_extension".into(), json!(extension));

        debug!("Loaded {} ({} bytes)", source, content.len());
        Ok(Document::new(
            vec![Element::text(content).with_metadata(element_meta)],
            metadata,
        ))
    }

    fn supported_extensions(&self) -> &[&'static str] {
        EXTENSIONS
    }
}
