use std::sync::Arc;

use tokio::sync::Mutex;

use super::Pipeline;
use crate::config::DEFAULT_COLLECTION;
use crate::models::QuantizationConfig;
use crate::ports::{Chunker, DocumentLoader, Generator, Retriever, TextEmbedder, VectorStore};
use crate::prompts::PromptTemplate;
use crate::retrieval::VectorRetriever;
use crate::{Error, Result};

/// Fluent construction of a [`Pipeline`].
///
/// Loader, chunker, embedder, vector store and generator are required. Without
/// an explicit retriever the pipeline searches its own collection by vector
/// similarity.
#[derive(Default)]
pub struct PipelineBuilder {
    loader: Option<Arc<dyn DocumentLoader>>,
    chunker: Option<Arc<dyn Chunker>>,
    embedder: Option<Arc<dyn TextEmbedder>>,
    store: Option<Arc<dyn VectorStore>>,
    retriever: Option<Arc<dyn Retriever>>,
    generator: Option<Arc<dyn Generator>>,
    collection: Option<String>,
    quantization: QuantizationConfig,
    prompt: Option<PromptTemplate>,
}

fn missing(component: &str) -> Error {
    Error::InvalidConfig(format!("pipeline is missing a {}", component))
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn TextEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    pub fn quantization(mut self, quantization: QuantizationConfig) -> Self {
        self.quantization = quantization;
        self
    }

    pub fn prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let loader = self.loader.ok_or_else(|| missing("document loader"))?;
        let chunker = self.chunker.ok_or_else(|| missing("chunker"))?;
        let embedder = self.embedder.ok_or_else(|| missing("embedder"))?;
        let store = self.store.ok_or_else(|| missing("vector store"))?;
        let generator = self.generator.ok_or_else(|| missing("generator"))?;

        let collection = self
            .collection
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
        if collection.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "collection name is empty".to_string(),
            ));
        }

        let retriever = match self.retriever {
            Some(retriever) => retriever,
            None => Arc::new(VectorRetriever::new(
                embedder.clone(),
                store.clone(),
                collection.clone(),
            )),
        };

        Ok(Pipeline {
            loader,
            chunker,
            embedder,
            store,
            retriever,
            generator,
            collection,
            quantization: self.quantization,
            prompt: self.prompt.unwrap_or_default(),
            collection_initialized: Mutex::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        FixedSizeChunker, HashEmbedder, InMemoryVectorStore, OllamaGenerator, TextLoader,
    };

    fn complete() -> PipelineBuilder {
        PipelineBuilder::new()
            .loader(Arc::new(TextLoader::new()))
            .chunker(Arc::new(FixedSizeChunker::default()))
            .embedder(Arc::new(HashEmbedder::new(32)))
            .vector_store(Arc::new(InMemoryVectorStore::new()))
            .generator(Arc::new(
                OllamaGenerator::with_url("http://localhost:11434", "llama3.2").unwrap(),
            ))
    }

    #[test]
    fn defaults_to_vector_retriever_over_own_collection() {
        let pipeline = complete().collection("notes").build().unwrap();
        assert_eq!(pipeline.collection(), "notes");
        assert_eq!(pipeline.retriever().name(), "vector");
        assert_eq!(pipeline.prompt(), &PromptTemplate::default());
    }

    #[test]
    fn default_collection_name() {
        let pipeline = complete().build().unwrap();
        assert_eq!(pipeline.collection(), DEFAULT_COLLECTION);
    }

    #[test]
    fn missing_components_are_invalid_config() {
        let err = PipelineBuilder::new().build().err();
        assert!(matches!(err, Some(Error::InvalidConfig(_))));

        let err = complete().collection("  ").build().err();
        assert!(matches!(err, Some(Error::InvalidConfig(_))));
    }

    #[test]
    fn each_required_component_is_checked() {
        let builders = [
            PipelineBuilder {
                loader: None,
                ..complete()
            },
            PipelineBuilder {
                chunker: None,
                ..complete()
            },
            PipelineBuilder {
                embedder: None,
                ..complete()
            },
            PipelineBuilder {
                store: None,
                ..complete()
            },
            PipelineBuilder {
                generator: None,
                ..complete()
            },
        ];

        for builder in builders {
            let err = builder.build().err().map(|e| e.to_string());
            assert!(err.unwrap().contains("missing"));
        }
    }
}
