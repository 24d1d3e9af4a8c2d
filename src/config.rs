//! Configuration for the retrieval engine
//!
//! Loads configuration from polyrag.yml, with `${VAR}` placeholders and
//! environment variables taking precedence over file values.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapters::{gemini, ollama};
use crate::models::QuantizationConfig;
use crate::prompts::PromptTemplate;
use crate::{Error, Result};

/// Default constants (fallback if polyrag.yml not found)
pub const CONFIG_FILE: &str = "polyrag.yml";
pub const DEFAULT_COLLECTION: &str = "polyrag";
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_RERANK_FACTOR: usize = 3;
pub const DEFAULT_FUSION_FACTOR: usize = 2;
pub const DEFAULT_GRAPH_DEPTH: usize = 1;
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// Retrieval strategy selectable from config or the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Vector,
    #[serde(alias = "late_interaction", alias = "colbert")]
    Late,
    Graph,
    Hybrid,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Vector => "vector",
            StrategyKind::Late => "late",
            StrategyKind::Graph => "graph",
            StrategyKind::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "vector" => Ok(StrategyKind::Vector),
            "late" | "late_interaction" | "colbert" => Ok(StrategyKind::Late),
            "graph" => Ok(StrategyKind::Graph),
            "hybrid" => Ok(StrategyKind::Hybrid),
            other => Err(Error::InvalidConfig(format!(
                "unknown retrieval strategy: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub collection: String,
    pub top_k: usize,
    /// Custom system prompt template containing `{context}`
    pub system_prompt_file: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            top_k: DEFAULT_TOP_K,
            system_prompt_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: crate::adapters::chunker::DEFAULT_CHUNK_SIZE,
            overlap: crate::adapters::chunker::DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphRetrievalConfig {
    /// Node label searched for query matches
    pub label: String,
    pub content_property: String,
    pub depth: usize,
    pub preview_chars: usize,
}

impl Default for GraphRetrievalConfig {
    fn default() -> Self {
        Self {
            label: "Chunk".to_string(),
            content_property: "content".to_string(),
            depth: DEFAULT_GRAPH_DEPTH,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub strategy: StrategyKind,
    /// Over-retrieval multiplier for late-interaction reranking
    pub rerank_factor: usize,
    /// Over-retrieval multiplier for each fused strategy
    pub fusion_factor: usize,
    /// Strategies fused by the hybrid retriever, in order
    pub hybrid_strategies: Vec<StrategyKind>,
    /// One weight per hybrid strategy; uniform when absent
    pub weights: Option<Vec<f64>>,
    /// Per-strategy timeout for hybrid fan-out
    pub timeout_secs: Option<u64>,
    pub graph: GraphRetrievalConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Vector,
            rerank_factor: DEFAULT_RERANK_FACTOR,
            fusion_factor: DEFAULT_FUSION_FACTOR,
            hybrid_strategies: vec![StrategyKind::Vector, StrategyKind::Late],
            weights: None,
            timeout_secs: None,
            graph: GraphRetrievalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// `qdrant` or `memory`
    pub provider: String,
    pub url: String,
    pub quantization: QuantizationConfig,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: "qdrant".to_string(),
            url: "http://localhost:6334".to_string(),
            quantization: QuantizationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphStoreConfig {
    /// `neo4j` or `memory`
    pub provider: String,
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            provider: "neo4j".to_string(),
            uri: crate::adapters::neo4j::DEFAULT_URI.to_string(),
            user: crate::adapters::neo4j::DEFAULT_USER.to_string(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `ollama`, `openai`, `gemini` or `hash`
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub url: String,
    pub api_key: Option<String>,
    /// Column count of the per-token matrices used for late interaction
    pub token_dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: ollama::DEFAULT_EMBED_MODEL.to_string(),
            dimension: 768,
            url: ollama::OLLAMA_URL.to_string(),
            api_key: None,
            token_dimension: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `ollama` or `gemini`
    pub provider: String,
    pub model: String,
    pub url: String,
    /// Gemini only; falls back to `GOOGLE_API_KEY`
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: ollama::DEFAULT_MODEL.to_string(),
            url: ollama::OLLAMA_URL.to_string(),
            api_key: None,
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub vector_store: VectorStoreConfig,
    pub graph_store: GraphStoreConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
}

impl Config {
    /// Load configuration from polyrag.yml (current or parent directory) or use defaults.
    /// Environment variables take precedence over polyrag.yml values.
    pub fn new() -> Result<Self> {
        Self::load_from_file(CONFIG_FILE)
            .or_else(|_| Self::load_from_file(Path::new("..").join(CONFIG_FILE)))
            .or_else(|_| {
                debug!("No {} found, using defaults", CONFIG_FILE);
                Self::load_dotenv();
                let mut config = Self::default();
                config.apply_env();
                config.validate()?;
                Ok(config)
            })
    }

    /// Load an explicit file, or search the default locations when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::NotFound(format!("config file {}", path.display())));
                }
                Self::load_from_file(path)
            }
            None => Self::new(),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        // Load .env file first
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml_str(&content)?;
        debug!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse YAML, resolve environment values and validate.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        // Try to load from current directory first, then parent
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR},
    /// then the explicit env key, then the value itself.
    fn resolve_env_string(value: &str, env_key: Option<&str>) -> String {
        if value.starts_with("${") && value.ends_with('}') {
            let var_name = &value[2..value.len() - 1];
            if let Ok(env_val) = std::env::var(var_name) {
                return env_val;
            }
        }
        if let Some(Ok(env_val)) = env_key.map(std::env::var) {
            return env_val;
        }
        value.to_string()
    }

    fn apply_env(&mut self) {
        self.vector_store.url = Self::resolve_env_string(&self.vector_store.url, Some("QDRANT_URL"));

        self.graph_store.uri = Self::resolve_env_string(&self.graph_store.uri, Some("NEO4J_URI"));
        self.graph_store.user =
            Self::resolve_env_string(&self.graph_store.user, Some("NEO4J_USER"));
        self.graph_store.password =
            Self::resolve_env_string(&self.graph_store.password, Some("NEO4J_PASSWORD"));

        self.apply_gemini_defaults();

        let llm_url_key = (self.llm.provider == "ollama").then_some("OLLAMA_URL");
        self.llm.url = Self::resolve_env_string(&self.llm.url, llm_url_key);
        self.llm.model = Self::resolve_env_string(&self.llm.model, None);
        let llm_key_env = (self.llm.provider == "gemini").then_some(gemini::API_KEY_ENV);
        self.llm.api_key = Self::resolve_api_key(self.llm.api_key.as_deref(), llm_key_env);

        let embed_url_key = (self.embedding.provider == "ollama").then_some("OLLAMA_URL");
        self.embedding.url = Self::resolve_env_string(&self.embedding.url, embed_url_key);
        self.embedding.model = Self::resolve_env_string(&self.embedding.model, None);
        let embed_key_env = match self.embedding.provider.as_str() {
            "gemini" => gemini::API_KEY_ENV,
            _ => "OPENAI_API_KEY",
        };
        self.embedding.api_key =
            Self::resolve_api_key(self.embedding.api_key.as_deref(), Some(embed_key_env));
    }

    fn resolve_api_key(value: Option<&str>, env_key: Option<&str>) -> Option<String> {
        let resolved = Self::resolve_env_string(value.unwrap_or_default(), env_key);
        (!resolved.trim().is_empty()).then_some(resolved)
    }

    /// Sections that name `gemini` but keep the Ollama URL and model defaults
    /// get the Gemini ones instead.
    fn apply_gemini_defaults(&mut self) {
        if self.llm.provider == "gemini" {
            if self.llm.url == ollama::OLLAMA_URL {
                self.llm.url = gemini::GEMINI_API_URL.to_string();
            }
            if self.llm.model == ollama::DEFAULT_MODEL {
                self.llm.model = gemini::DEFAULT_MODEL.to_string();
            }
        }

        if self.embedding.provider == "gemini" {
            if self.embedding.url == ollama::OLLAMA_URL {
                self.embedding.url = gemini::GEMINI_API_URL.to_string();
            }
            if self.embedding.model == ollama::DEFAULT_EMBED_MODEL {
                self.embedding.model = gemini::DEFAULT_EMBED_MODEL.to_string();
            }
        }
    }

    /// Reject settings no component could run with.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.size == 0 || self.chunking.overlap >= self.chunking.size {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap ({}) must be less than chunking.size ({})",
                self.chunking.overlap, self.chunking.size
            )));
        }

        if self.pipeline.collection.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "pipeline.collection must not be empty".to_string(),
            ));
        }

        let retrieval = &self.retrieval;
        if retrieval.rerank_factor == 0 || retrieval.fusion_factor == 0 {
            return Err(Error::InvalidConfig(
                "retrieval factors must be at least 1".to_string(),
            ));
        }

        if retrieval.hybrid_strategies.contains(&StrategyKind::Hybrid) {
            return Err(Error::InvalidConfig(
                "hybrid_strategies cannot contain hybrid".to_string(),
            ));
        }

        if let Some(weights) = &retrieval.weights {
            if weights.len() != retrieval.hybrid_strategies.len() {
                return Err(Error::InvalidConfig(format!(
                    "{} weights for {} hybrid strategies",
                    weights.len(),
                    retrieval.hybrid_strategies.len()
                )));
            }
        }

        if self.embedding.dimension == 0 || self.embedding.token_dimension == 0 {
            return Err(Error::InvalidConfig(
                "embedding dimensions must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Custom system prompt, if configured.
    pub fn system_prompt(&self) -> Result<Option<PromptTemplate>> {
        self.pipeline
            .system_prompt_file
            .as_deref()
            .map(PromptTemplate::from_file)
            .transpose()
    }
}
