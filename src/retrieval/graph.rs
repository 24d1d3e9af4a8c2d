use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::config::GraphRetrievalConfig;
use crate::models::{Chunk, ChunkType, Metadata, RetrievalResult};
use crate::ports::{GraphNode, GraphStore, RetrieveOptions, Retriever, Subgraph};
use crate::Result;

pub const SOURCE: &str = "graph";

/// Which nodes to match and how far to expand them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRetrieverOptions {
    pub label: String,
    pub content_property: String,
    pub depth: usize,
    /// Longest preview of a related node, in characters
    pub preview_chars: usize,
}

impl Default for GraphRetrieverOptions {
    fn default() -> Self {
        Self::from(&GraphRetrievalConfig::default())
    }
}

impl From<&GraphRetrievalConfig> for GraphRetrieverOptions {
    fn from(config: &GraphRetrievalConfig) -> Self {
        Self {
            label: config.label.clone(),
            content_property: config.content_property.clone(),
            depth: config.depth,
            preview_chars: config.preview_chars,
        }
    }
}

/// Matches graph nodes by text and turns their neighbourhood into context.
///
/// Every hit scores 1.0; the order is the store's match order. Vector-store
/// filters do not apply here and are ignored.
pub struct GraphRetriever {
    store: Arc<dyn GraphStore>,
    options: GraphRetrieverOptions,
}

impl GraphRetriever {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self::with_options(store, GraphRetrieverOptions::default())
    }

    pub fn with_options(store: Arc<dyn GraphStore>, options: GraphRetrieverOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &GraphRetrieverOptions {
        &self.options
    }

    fn synthesize(&self, center: &GraphNode, subgraph: &Subgraph) -> String {
        let property = self.options.content_property.as_str();
        let mut lines = vec![format!("Main: {}", center.property_str(property))];

        for node in subgraph.nodes.iter().filter(|n| n.id != center.id) {
            let content = node.property_str(property);
            if content.is_empty() {
                continue;
            }
            lines.push(format!(
                "Related: {}",
                preview(content, self.options.preview_chars)
            ));
        }

        for relationship in &subgraph.relationships {
            lines.push(format!("[{}]", relationship.relation_type));
        }

        lines.join("\n")
    }

    fn to_result(&self, node: GraphNode, subgraph: Subgraph) -> Result<RetrievalResult> {
        let center = subgraph
            .nodes
            .iter()
            .find(|n| n.id == node.id)
            .unwrap_or(&node);
        let text = self.synthesize(center, &subgraph);

        let original_content = center.property_str(&self.options.content_property).to_string();
        let source_document_id = match center.property_str("source_document_id") {
            "" => SOURCE.to_string(),
            id => id.to_string(),
        };

        let mut chunk_metadata = Metadata::new();
        chunk_metadata.insert("original_content".into(), json!(original_content));
        chunk_metadata.insert("subgraph_nodes".into(), json!(subgraph.nodes.len()));
        chunk_metadata.insert(
            "subgraph_relations".into(),
            json!(subgraph.relationships.len()),
        );

        let chunk = Chunk::with_id(node.id.clone(), text, ChunkType::Text, source_document_id)
            .with_metadata(chunk_metadata);

        let mut metadata = Metadata::new();
        metadata.insert("subgraph".into(), serde_json::to_value(&subgraph)?);

        Ok(RetrievalResult::new(chunk, 1.0, SOURCE).with_metadata(metadata))
    }
}

/// First `max_chars` characters, with `...` only when something was cut.
fn preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

#[async_trait]
impl Retriever for GraphRetriever {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn retrieve(
        &self,
        query: &str,
        limit: usize,
        _options: &RetrieveOptions,
    ) -> Result<Vec<RetrievalResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let matches = self
            .store
            .find_nodes(
                &self.options.label,
                &self.options.content_property,
                query,
                limit,
            )
            .await?;

        let mut results = Vec::with_capacity(matches.len());
        for node in matches.into_iter().take(limit) {
            let subgraph = self.store.get_subgraph(&node.id, self.options.depth).await?;
            results.push(self.to_result(node, subgraph)?);
        }

        debug!("Graph search matched {} nodes", results.len());
        Ok(results)
    }
}
