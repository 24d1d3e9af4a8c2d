use std::path::Path;

use async_trait::async_trait;

use crate::models::Document;
use crate::Result;

/// Turns a file into a [`Document`].
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Document>;

    /// Lowercase extensions including the leading dot, e.g. `".md"`.
    fn supported_extensions(&self) -> &[&'static str];

    /// Whether `path` has one of the supported extensions.
    fn supports(&self, path: &Path) -> bool {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => {
                let ext = format!(".{}", ext.to_lowercase());
                self.supported_extensions().iter().any(|s| *s == ext)
            }
            None => false,
        }
    }
}
