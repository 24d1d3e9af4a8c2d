use async_trait::async_trait;

use crate::Result;

/// Token-level embedding matrix: one row per token, fixed column count.
pub type TokenMatrix = Vec<Vec<f32>>;

/// Single-vector text embedding model.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| crate::Error::UpstreamFailure("No embedding returned".to_string()))
    }

    /// Embed many texts in one call. Output order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Vector length. Stable for the lifetime of the embedder.
    fn dimension(&self) -> usize;
}

/// Per-token embedding model used for late interaction.
#[async_trait]
pub trait TokenEmbedder: Send + Sync {
    async fn embed_query_tokens(&self, text: &str) -> Result<TokenMatrix>;

    async fn embed_doc_tokens(&self, text: &str) -> Result<TokenMatrix>;
}
