//! Ollama client for local LLM inference and embeddings.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::stream::{line_text_stream, trimmed_line};
use crate::ports::{Generator, TextEmbedder, TextStream};
use crate::{Error, Result};

pub const OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| Error::InvalidConfig(format!("HTTP client error: {}", e)))
}

/// Text generation through `/api/generate`.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    /// Create client with default URL.
    pub fn new(model: impl Into<String>) -> Result<Self> {
        Self::with_url(OLLAMA_URL, model)
    }

    /// Create client with custom URL.
    pub fn with_url(base_url: &str, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// Check if Ollama server is running.
    pub async fn is_running(&self) -> bool {
        self.http
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn post_generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            system: system_prompt.map(|s| s.to_string()),
            stream,
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::UpstreamFailure(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamFailure(format!(
                "Ollama error {}: {}",
                status, text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let response = self.post_generate(prompt, system_prompt, false).await?;

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::UpstreamFailure(format!("Invalid response: {}", e)))?;

        Ok(result.response)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<TextStream> {
        let response = self.post_generate(prompt, system_prompt, true).await?;
        debug!("Streaming generation from {}", self.model);
        Ok(line_text_stream(
            response.bytes_stream().boxed(),
            "Ollama",
            parse_stream_line,
        ))
    }
}

/// One line of a streaming `/api/generate` body (newline-delimited JSON).
fn parse_stream_line(line: &[u8]) -> Result<Option<String>> {
    let Some(line) = trimmed_line(line)? else {
        return Ok(None);
    };

    let chunk: StreamChunk = serde_json::from_str(line)?;
    if let Some(error) = chunk.error {
        return Err(Error::UpstreamFailure(format!("Ollama error: {}", error)));
    }

    Ok(chunk.response.filter(|piece| !piece.is_empty()))
}

/// Text embeddings through `/api/embed`.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    http: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    pub fn with_url(base_url: &str, model: impl Into<String>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidConfig(
                "embedding dimension must be positive".to_string(),
            ));
        }

        Ok(Self {
            http: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
        })
    }
}

#[async_trait]
impl TextEmbedder for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .http
            .post(format!("{}/api/embed", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::UpstreamFailure(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamFailure(format!(
                "Ollama error {}: {}",
                status, text
            )));
        }

        let result: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::UpstreamFailure(format!("Invalid response: {}", e)))?;

        if result.embeddings.len() != texts.len() {
            return Err(Error::UpstreamFailure(format!(
                "Ollama returned {} embeddings for {} texts",
                result.embeddings.len(),
                texts.len()
            )));
        }

        if let Some(bad) = result
            .embeddings
            .iter()
            .find(|e| e.len() != self.dimension)
        {
            return Err(Error::InvalidQuery(format!(
                "embedding dimension {} does not match configured {}",
                bad.len(),
                self.dimension
            )));
        }

        Ok(result.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    response: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}
