//! Ingestion and question answering over a configured retriever.
//!
//! Ingestion: load -> chunk -> embed (one batch) -> insert (one batch).
//! Query: retrieve -> build context -> render system prompt -> generate.

mod builder;

pub use builder::PipelineBuilder;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::models::{Chunk, Document, QuantizationConfig, RetrievalResult};
use crate::ports::{
    Chunker, DocumentLoader, Generator, RetrieveOptions, Retriever, TextEmbedder, TextStream,
    VectorStore,
};
use crate::prompts::PromptTemplate;
use crate::{Error, Result};

/// Context used when retrieval comes back empty.
pub const NO_CONTEXT: &str = "No relevant context found.";

/// Outcome of one ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    /// Files skipped during a directory walk, as `PartialLoadFailure`s
    pub failures: Vec<Error>,
}

/// End-to-end RAG pipeline. Build with [`PipelineBuilder`].
pub struct Pipeline {
    loader: Arc<dyn DocumentLoader>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn TextEmbedder>,
    store: Arc<dyn VectorStore>,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    collection: String,
    quantization: QuantizationConfig,
    prompt: PromptTemplate,
    collection_initialized: Mutex<bool>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    pub fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    /// Ingest a file or directory. Returns the number of stored chunks.
    pub async fn ingest(&self, path: &Path) -> Result<usize> {
        Ok(self.ingest_with_report(path).await?.chunks)
    }

    /// Ingest a file or directory, reporting skipped files.
    pub async fn ingest_with_report(&self, path: &Path) -> Result<IngestReport> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(Error::NotFound(format!("path {}", path.display())));
        }

        let mut report = IngestReport::default();
        let documents = if path.is_dir() {
            self.load_directory(path, &mut report).await
        } else {
            vec![self.loader.load(path).await?]
        };
        report.documents = documents.len();

        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| self.chunker.chunk(doc))
            .collect();
        if chunks.is_empty() {
            info!("No chunks produced from {}", path.display());
            self.ensure_collection().await?;
            return Ok(report);
        }

        let chunks = self.embed_chunks(chunks).await?;
        self.ensure_collection().await?;
        self.store.insert(&self.collection, &chunks).await?;

        report.chunks = chunks.len();
        info!(
            "Ingested {} chunks from {} documents into '{}'",
            report.chunks, report.documents, self.collection
        );
        Ok(report)
    }

    async fn load_directory(&self, dir: &Path, report: &mut IngestReport) -> Vec<Document> {
        let files: Vec<PathBuf> = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!("Skipping unreadable entry under {}: {}", dir.display(), err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.loader.supports(path))
            .collect();

        debug!("Found {} loadable files in {}", files.len(), dir.display());

        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            match self.loader.load(&file).await {
                Ok(doc) => documents.push(doc),
                Err(err) => {
                    let failure = Error::PartialLoadFailure {
                        path: file.display().to_string(),
                        reason: err.to_string(),
                    };
                    warn!("{}", failure);
                    report.failures.push(failure);
                }
            }
        }
        documents
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(Error::UpstreamFailure(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        Ok(chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| chunk.with_embedding(embedding))
            .collect())
    }

    /// Create the collection once per pipeline.
    async fn ensure_collection(&self) -> Result<()> {
        let mut initialized = self.collection_initialized.lock().await;
        if *initialized {
            return Ok(());
        }

        self.store
            .create_collection(
                &self.collection,
                self.embedder.dimension(),
                &self.quantization,
            )
            .await?;
        *initialized = true;

        info!(
            "Collection '{}' ready (dimension {})",
            self.collection,
            self.embedder.dimension()
        );
        Ok(())
    }

    /// Ranked chunks for a query.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        options: &RetrieveOptions,
    ) -> Result<Vec<RetrievalResult>> {
        self.retriever.retrieve(query, top_k, options).await
    }

    /// Answer a question from the top `top_k` chunks.
    ///
    /// `prompt` replaces the pipeline's template for this call only.
    pub async fn query(
        &self,
        question: &str,
        top_k: usize,
        prompt: Option<&PromptTemplate>,
    ) -> Result<String> {
        let system_prompt = self.system_prompt_for(question, top_k, prompt).await?;
        self.generator
            .generate(question, Some(&system_prompt))
            .await
    }

    /// Stream the answer to a question.
    pub async fn query_stream(
        &self,
        question: &str,
        top_k: usize,
        prompt: Option<&PromptTemplate>,
    ) -> Result<TextStream> {
        let system_prompt = self.system_prompt_for(question, top_k, prompt).await?;
        self.generator
            .generate_stream(question, Some(&system_prompt))
            .await
    }

    async fn system_prompt_for(
        &self,
        question: &str,
        top_k: usize,
        prompt: Option<&PromptTemplate>,
    ) -> Result<String> {
        let results = self
            .retrieve(question, top_k, &RetrieveOptions::default())
            .await?;
        debug!(
            "Retrieved {} chunks via {}",
            results.len(),
            self.retriever.name()
        );
        let template = prompt.unwrap_or(&self.prompt);
        Ok(template.render(&build_context(&results)))
    }
}

/// Numbered context blocks, best first.
pub fn build_context(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return NO_CONTEXT.to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let source = result
                .chunk
                .metadata
                .get("file_name")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown source");
            format!(
                "[{}] (Source: {}, Score: {:.3})\n{}",
                i + 1,
                source,
                result.score,
                result.chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
