//! Text and token embedders
//!
//! - [`OpenAIEmbedder`] calls the OpenAI embeddings API
//! - [`HashEmbedder`] is a deterministic bag-of-words embedder for offline use
//! - [`HashTokenEmbedder`] produces per-token matrices for late interaction

use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use async_trait::async_trait;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::ports::{TextEmbedder, TokenEmbedder, TokenMatrix};
use crate::{Error, Result};

pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";

/// Longest text (in bytes) sent to the API; longer inputs are cut at a char boundary.
const MAX_INPUT_BYTES: usize = 8000;

/// Embedder backed by the OpenAI embeddings endpoint.
pub struct OpenAIEmbedder {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
}

impl OpenAIEmbedder {
    /// Create from `OPENAI_API_KEY`.
    pub fn new() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::InvalidConfig("OPENAI_API_KEY not set".to_string()))?;
        Self::with_api_key(api_key, DEFAULT_OPENAI_MODEL)
    }

    pub fn with_api_key(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::InvalidConfig("OpenAI API key is empty".to_string()));
        }

        let config = OpenAIConfig::new().with_api_key(api_key);
        Ok(Self {
            client: OpenAIClient::with_config(config),
            model: model.into(),
        })
    }

    /// Create with custom model
    pub fn with_model(model: impl Into<String>) -> Result<Self> {
        let mut embedder = Self::new()?;
        embedder.model = model.into();
        Ok(embedder)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextEmbedder for OpenAIEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let processed: Vec<String> = texts
            .iter()
            .map(|t| truncate_bytes(t.trim(), MAX_INPUT_BYTES).to_string())
            .filter(|t| !t.is_empty())
            .collect();

        // Blank inputs are rejected by the API; they get zero vectors instead.
        if processed.is_empty() {
            return Ok(vec![vec![0.0; self.dimension()]; texts.len()]);
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(processed))
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        info!(
            "Generated {} embeddings, tokens used: {}",
            response.data.len(),
            response.usage.total_tokens
        );

        let mut result = Vec::with_capacity(texts.len());
        let mut embed_iter = response.data.into_iter();

        for text in texts {
            if text.trim().is_empty() {
                result.push(vec![0.0; self.dimension()]);
            } else {
                let embedding = embed_iter.next().ok_or_else(|| {
                    Error::UpstreamFailure("OpenAI returned fewer embeddings than inputs".into())
                })?;
                result.push(embedding.embedding);
            }
        }

        Ok(result)
    }

    fn dimension(&self) -> usize {
        openai_dimension(&self.model)
    }
}

/// Known output size of an OpenAI embedding model.
pub fn openai_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-small" => 1536,
        "text-embedding-3-large" => 3072,
        "text-embedding-ada-002" => 1536,
        _ => 1536,
    }
}

fn truncate_bytes(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Deterministic, fast embedding for offline/local use.
///
/// Each lowercased whitespace token is hashed (xxh3) into one of `dim`
/// buckets; the bucket counts are L2-normalised. Distinct tokens can share a
/// bucket, so unrelated texts may score above zero.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dim];
        for token in text.split_whitespace() {
            vec[bucket(token, self.dim)] += 1.0;
        }

        normalize(&mut vec);
        vec
    }
}

#[async_trait]
impl TextEmbedder for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// Token embedder for late interaction without a model: one unit row per
/// token, hashed on the lowercased, punctuation-trimmed token.
///
/// Identical tokens therefore score 1.0 against each other and distinct
/// tokens score 0.0 unless their hashes collide.
#[derive(Debug, Clone)]
pub struct HashTokenEmbedder {
    dim: usize,
}

impl HashTokenEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    fn embed_tokens(&self, text: &str) -> TokenMatrix {
        text.split_whitespace()
            .map(|raw| raw.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|token| !token.is_empty())
            .map(|token| {
                let mut row = vec![0.0f32; self.dim];
                row[bucket(token, self.dim)] = 1.0;
                row
            })
            .collect()
    }
}

#[async_trait]
impl TokenEmbedder for HashTokenEmbedder {
    async fn embed_query_tokens(&self, text: &str) -> Result<TokenMatrix> {
        Ok(self.embed_tokens(text))
    }

    async fn embed_doc_tokens(&self, text: &str) -> Result<TokenMatrix> {
        Ok(self.embed_tokens(text))
    }
}

/// xxh3 of the lowercased token, so bucket placement is the same on every
/// platform and toolchain.
fn bucket(token: &str, dim: usize) -> usize {
    (xxh3_64(token.to_lowercase().as_bytes()) % dim as u64) as usize
}

pub(crate) fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}
