//! System prompt templates for answer generation.

use std::path::Path;

use crate::{Error, Result};

/// Placeholder replaced by the assembled retrieval context.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the user's question based on the provided context.
If the context doesn't contain relevant information, say so honestly.

Context:
{context}
";

/// System prompt with a `{context}` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Custom template. Must contain `{context}`.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(CONTEXT_PLACEHOLDER) {
            return Err(Error::InvalidConfig(format!(
                "system prompt must contain the {} placeholder",
                CONTEXT_PLACEHOLDER
            )));
        }
        Ok(Self { template })
    }

    /// Load a template from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let template = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to load prompt {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::new(template)
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute the context into every placeholder.
    pub fn render(&self, context: &str) -> String {
        self.template.replace(CONTEXT_PLACEHOLDER, context)
    }
}
