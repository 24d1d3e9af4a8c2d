//! Google Gemini generation and embeddings over the REST API.
//!
//! - [`GeminiGenerator`]: `generateContent` and `streamGenerateContent` (SSE)
//! - [`GeminiEmbedder`]: `batchEmbedContents`

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::stream::{line_text_stream, trimmed_line};
use crate::ports::{Generator, TextEmbedder, TextStream};
use crate::{Error, Result};

pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-004";
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

const API_KEY_HEADER: &str = "x-goog-api-key";

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| Error::InvalidConfig(format!("HTTP client error: {}", e)))
}

/// Explicit key, else `GOOGLE_API_KEY`. Blank keys are rejected.
fn resolve_api_key(api_key: Option<String>) -> Result<String> {
    let key = match api_key {
        Some(key) => key,
        None => env::var(API_KEY_ENV)
            .map_err(|_| Error::InvalidConfig(format!("{} is not set", API_KEY_ENV)))?,
    };
    if key.trim().is_empty() {
        return Err(Error::InvalidConfig("Gemini API key is empty".to_string()));
    }
    Ok(key)
}

/// `models/text-embedding-004` and `text-embedding-004` name the same model.
fn bare_model(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(Error::UpstreamFailure(format!(
        "Gemini error {}: {}",
        status, text
    )))
}

/// Text generation with an optional system instruction.
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiGenerator {
    /// Key from `api_key`, or `GOOGLE_API_KEY` when `None`.
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_url(GEMINI_API_URL, api_key, model)
    }

    pub fn with_url(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let model = model.into();
        Ok(Self {
            http: http_client()?,
            api_key: resolve_api_key(api_key)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: bare_model(&model).to_string(),
        })
    }

    fn request(&self, prompt: &str, system_prompt: Option<&str>) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(prompt)],
            }],
            system_instruction: system_prompt.map(|s| Content {
                role: None,
                parts: vec![Part::text(s)],
            }),
        }
    }

    async fn post(
        &self,
        method: &str,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}/models/{}:{}", self.base_url, self.model, method))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&self.request(prompt, system_prompt))
            .send()
            .await
            .map_err(|e| Error::UpstreamFailure(format!("Gemini request failed: {}", e)))?;

        check_status(response).await
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let response = self
            .post("generateContent", prompt, system_prompt)
            .await?;

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::UpstreamFailure(format!("Invalid Gemini response: {}", e)))?;

        body.into_text()?
            .ok_or_else(|| Error::UpstreamFailure("Empty response from Gemini".to_string()))
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<TextStream> {
        let response = self
            .post("streamGenerateContent?alt=sse", prompt, system_prompt)
            .await?;
        debug!("Streaming generation from {}", self.model);
        Ok(line_text_stream(
            response.bytes_stream().boxed(),
            "Gemini",
            parse_sse_line,
        ))
    }
}

/// One server-sent-events line; only `data:` lines carry content.
fn parse_sse_line(line: &[u8]) -> Result<Option<String>> {
    let Some(line) = trimmed_line(line)? else {
        return Ok(None);
    };
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };

    let chunk: GenerateContentResponse = serde_json::from_str(data.trim())?;
    chunk.into_text()
}

/// Document embeddings through `batchEmbedContents`.
#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

impl GeminiEmbedder {
    pub fn new(api_key: Option<String>, model: impl Into<String>, dimension: usize) -> Result<Self> {
        Self::with_url(GEMINI_API_URL, api_key, model, dimension)
    }

    pub fn with_url(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidConfig(
                "embedding dimension must be positive".to_string(),
            ));
        }

        let model = model.into();
        Ok(Self {
            http: http_client()?,
            api_key: resolve_api_key(api_key)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: bare_model(&model).to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl TextEmbedder for GeminiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = format!("models/{}", self.model);
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: model.clone(),
                    content: Content {
                        role: None,
                        parts: vec![Part::text(text)],
                    },
                    task_type: "RETRIEVAL_DOCUMENT",
                })
                .collect(),
        };

        let response = self
            .http
            .post(format!(
                "{}/models/{}:batchEmbedContents",
                self.base_url, self.model
            ))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::UpstreamFailure(format!("Gemini request failed: {}", e)))?;

        let result: BatchEmbedResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::UpstreamFailure(format!("Invalid Gemini response: {}", e)))?;

        if result.embeddings.len() != texts.len() {
            return Err(Error::UpstreamFailure(format!(
                "Gemini returned {} embeddings for {} texts",
                result.embeddings.len(),
                texts.len()
            )));
        }

        result
            .embeddings
            .into_iter()
            .map(|embedding| {
                if embedding.values.len() != self.dimension {
                    return Err(Error::InvalidQuery(format!(
                        "embedding dimension {} does not match configured {}",
                        embedding.values.len(),
                        self.dimension
                    )));
                }
                Ok(embedding.values)
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// === Wire types ===

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: Option<String>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, all parts joined. `None` when it is empty.
    fn into_text(self) -> Result<Option<String>> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(Error::UpstreamFailure(format!(
                "Gemini blocked the prompt: {}",
                reason
            )));
        }

        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        Ok((!text.is_empty()).then_some(text))
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    task_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use httpmock::prelude::*;
    use serde_json::json;

    const KEY: &str = "test-key";

    fn generator(server: &MockServer) -> GeminiGenerator {
        GeminiGenerator::with_url(&server.base_url(), Some(KEY.into()), "gemini-test").unwrap()
    }

    fn embedder(server: &MockServer, dimension: usize) -> GeminiEmbedder {
        GeminiEmbedder::with_url(
            &server.base_url(),
            Some(KEY.into()),
            "models/embed-test",
            dimension,
        )
        .unwrap()
    }

    fn candidate(text: &str) -> serde_json::Value {
        json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }] })
    }

    #[test]
    fn blank_key_is_invalid_config() {
        let err = GeminiGenerator::new(Some("   ".into()), DEFAULT_MODEL).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn model_prefix_is_stripped() {
        let generator =
            GeminiGenerator::new(Some(KEY.into()), "models/gemini-2.5-flash").unwrap();
        assert_eq!(generator.model_name(), "gemini-2.5-flash");
        assert_eq!(bare_model("gemini-2.5-pro"), "gemini-2.5-pro");
    }

    #[tokio::test]
    async fn generate_sends_system_instruction_and_key() {
        let server = MockServer::start_async().await;

        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/models/gemini-test:generateContent")
                .header(API_KEY_HEADER, KEY)
                .matches(|req| {
                    let body: serde_json::Value =
                        serde_json::from_slice(req.body().as_ref()).unwrap();
                    body["contents"][0]["role"] == json!("user")
                        && body["contents"][0]["parts"][0]["text"] == json!("Capital of France?")
                        && body["systemInstruction"]["parts"][0]["text"]
                            .as_str()
                            .is_some_and(|s| s.contains("Context:"))
                });
            then.status(200).json_body(json!({
                "candidates": [{ "content": { "parts": [{ "text": "Par" }, { "text": "is" }] } }]
            }));
        });

        let answer = generator(&server)
            .generate("Capital of France?", Some("Context:\nfacts"))
            .await
            .unwrap();

        assert_eq!(answer, "Paris");
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn generate_omits_missing_system_instruction() {
        let server = MockServer::start_async().await;

        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/models/gemini-test:generateContent")
                .matches(|req| {
                    let body: serde_json::Value =
                        serde_json::from_slice(req.body().as_ref()).unwrap();
                    body.get("systemInstruction").is_none()
                });
            then.status(200).json_body(candidate("ok"));
        });

        assert_eq!(generator(&server).generate("hi", None).await.unwrap(), "ok");
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn generate_maps_http_and_empty_failures() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/models/gemini-test:generateContent");
            then.status(403).body("API key not valid");
        });

        let err = generator(&server).generate("hi", None).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamFailure(_)));
        assert!(err.to_string().contains("Gemini error 403"));

        let empty = MockServer::start_async().await;
        empty.mock(|when, then| {
            when.method(POST).path("/models/gemini-test:generateContent");
            then.status(200).json_body(json!({ "candidates": [] }));
        });
        let err = generator(&empty).generate("hi", None).await.unwrap_err();
        assert!(err.to_string().contains("Empty response"));
    }

    #[tokio::test]
    async fn blocked_prompt_is_upstream_failure() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/models/gemini-test:generateContent");
            then.status(200)
                .json_body(json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
        });

        let err = generator(&server).generate("hi", None).await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn generate_stream_reads_sse_in_order() {
        let server = MockServer::start_async().await;

        let body = format!(
            "data: {}\r\n\r\ndata: {}\r\n\r\ndata: {}\r\n\r\n",
            candidate("Hel"),
            json!({ "candidates": [{ "content": { "parts": [] } }] }),
            candidate("lo world"),
        );
        server.mock(|when, then| {
            when.method(POST)
                .path("/models/gemini-test:streamGenerateContent")
                .query_param("alt", "sse");
            then.status(200).body(body);
        });

        let pieces: Vec<String> = generator(&server)
            .generate_stream("hi", Some("sys"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(pieces, vec!["Hel", "lo world"]);
    }

    #[test]
    fn sse_parser_ignores_non_data_lines() {
        assert_eq!(parse_sse_line(b": keep-alive\n").unwrap(), None);
        assert_eq!(parse_sse_line(b"event: message\n").unwrap(), None);
        assert_eq!(parse_sse_line(b"\r\n").unwrap(), None);
        assert!(parse_sse_line(b"data: {not json}\n").is_err());
    }

    #[tokio::test]
    async fn embedder_returns_vectors_in_order() {
        let server = MockServer::start_async().await;

        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/models/embed-test:batchEmbedContents")
                .header(API_KEY_HEADER, KEY)
                .matches(|req| {
                    let body: serde_json::Value =
                        serde_json::from_slice(req.body().as_ref()).unwrap();
                    let requests = body["requests"].as_array().cloned().unwrap_or_default();
                    requests.len() == 2
                        && requests[0]["model"] == json!("models/embed-test")
                        && requests[0]["taskType"] == json!("RETRIEVAL_DOCUMENT")
                        && requests[1]["content"]["parts"][0]["text"] == json!("second")
                });
            then.status(200).json_body(json!({
                "embeddings": [{ "values": [1.0, 0.0, 0.0] }, { "values": [0.0, 1.0, 0.0] }]
            }));
        });

        let vectors = embedder(&server, 3)
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn embedder_rejects_count_and_dimension_mismatch() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/models/embed-test:batchEmbedContents");
            then.status(200)
                .json_body(json!({ "embeddings": [{ "values": [1.0, 0.0] }] }));
        });

        let texts = vec!["a".to_string(), "b".to_string()];
        let err = embedder(&server, 2).embed_batch(&texts).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamFailure(_)));

        let err = embedder(&server, 3)
            .embed_batch(&texts[..1])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn empty_batch_skips_request() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST);
            then.status(500);
        });

        assert!(embedder(&server, 3).embed_batch(&[]).await.unwrap().is_empty());
        mock.assert_calls(0);
    }
}
