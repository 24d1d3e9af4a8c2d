use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::Metadata;
use crate::{Error, Result};

/// One row returned by a graph query, keyed by column name.
pub type Record = Metadata;

/// Graph node with its labels and properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub labels: Vec<String>,
    pub properties: Metadata,
}

impl GraphNode {
    /// String property, empty when missing or not a string.
    pub fn property_str(&self, key: &str) -> &str {
        self.properties
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Build a node from a `{id, labels, properties}` record.
    pub fn from_record(record: &Record) -> Option<Self> {
        let properties = match record.get("properties") {
            Some(Value::Object(map)) => map.clone(),
            _ => Metadata::new(),
        };
        let id = record
            .get("id")
            .and_then(Value::as_str)
            .or_else(|| properties.get("id").and_then(Value::as_str))?
            .to_string();
        let labels = record
            .get("labels")
            .and_then(Value::as_array)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|l| l.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id,
            labels,
            properties,
        })
    }
}

/// Directed, typed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    #[serde(rename = "type")]
    pub relation_type: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub properties: Metadata,
}

/// Neighbourhood of a node, in the order the store returned it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
}

impl Subgraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }
}

/// Property graph database.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create a node and return its id (the `id` property, generated when absent).
    async fn add_node(&self, label: &str, properties: Metadata) -> Result<String>;

    async fn add_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
        properties: Metadata,
    ) -> Result<()>;

    /// Run a Cypher query.
    async fn query(&self, cypher: &str, parameters: Metadata) -> Result<Vec<Record>>;

    /// Node plus everything reachable within `depth` hops.
    async fn get_subgraph(&self, node_id: &str, depth: usize) -> Result<Subgraph>;

    /// Nodes with `label` whose `property` contains `needle`, case-insensitively.
    async fn find_nodes(
        &self,
        label: &str,
        property: &str,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<GraphNode>> {
        validate_identifier(label)?;
        validate_identifier(property)?;

        let cypher = format!(
            "MATCH (n:{label})
             WHERE toLower(n.{property}) CONTAINS toLower($needle)
             RETURN n.id AS id, labels(n) AS labels, properties(n) AS properties
             LIMIT $limit"
        );

        let mut params = Metadata::new();
        params.insert("needle".into(), json!(needle));
        params.insert("limit".into(), json!(limit));

        let records = self.query(&cypher, params).await?;
        Ok(records.iter().filter_map(GraphNode::from_record).collect())
    }
}

/// Labels, property names and relationship types are spliced into Cypher
/// text, so they are restricted to identifier characters.
pub fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "invalid graph identifier: {:?}",
            name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn validate_identifier_accepts_plain_names() {
        assert!(validate_identifier("Chunk").is_ok());
        assert!(validate_identifier("RELATED_TO").is_ok());
        assert!(validate_identifier("_private1").is_ok());
    }

    #[test]
    fn validate_identifier_rejects_injection() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("Chunk) DETACH DELETE (n").is_err());
        assert!(validate_identifier("a-b").is_err());
    }

    #[test]
    fn node_from_record_reads_columns() {
        let record: Record = serde_json::from_value(json!({
            "id": "n1",
            "labels": ["Chunk"],
            "properties": {"id": "n1", "content": "Rust graphs"}
        }))
        .unwrap();

        let node = GraphNode::from_record(&record).unwrap();
        assert_eq!(node.id, "n1");
        assert_eq!(node.labels, vec!["Chunk".to_string()]);
        assert_eq!(node.property_str("content"), "Rust graphs");
        assert_eq!(node.property_str("missing"), "");
    }

    #[test]
    fn node_from_record_falls_back_to_property_id() {
        let record: Record = serde_json::from_value(json!({
            "properties": {"id": "n2"}
        }))
        .unwrap();
        assert_eq!(GraphNode::from_record(&record).unwrap().id, "n2");

        let no_id: Record = serde_json::from_value(json!({"labels": []})).unwrap();
        assert!(GraphNode::from_record(&no_id).is_none());
    }

    /// Records every query it receives and answers with canned rows.
    struct RecordingStore {
        seen: Mutex<Vec<(String, Metadata)>>,
        rows: Vec<Record>,
    }

    #[async_trait]
    impl GraphStore for RecordingStore {
        async fn add_node(&self, _label: &str, _properties: Metadata) -> Result<String> {
            Ok("n".into())
        }

        async fn add_edge(&self, _: &str, _: &str, _: &str, _: Metadata) -> Result<()> {
            Ok(())
        }

        async fn query(&self, cypher: &str, parameters: Metadata) -> Result<Vec<Record>> {
            self.seen
                .lock()
                .unwrap()
                .push((cypher.to_string(), parameters));
            Ok(self.rows.clone())
        }

        async fn get_subgraph(&self, _node_id: &str, _depth: usize) -> Result<Subgraph> {
            Ok(Subgraph::default())
        }
    }

    #[tokio::test]
    async fn default_find_nodes_issues_case_insensitive_cypher() {
        let store = RecordingStore {
            seen: Mutex::new(Vec::new()),
            rows: vec![serde_json::from_value(json!({
                "id": "n1",
                "labels": ["Chunk"],
                "properties": {"content": "Alpha"}
            }))
            .unwrap()],
        };

        let nodes = store.find_nodes("Chunk", "content", "alpha", 3).await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "n1");

        let seen = store.seen.lock().unwrap();
        let (cypher, params) = &seen[0];
        assert!(cypher.contains("MATCH (n:Chunk)"));
        assert!(cypher.contains("toLower(n.content) CONTAINS toLower($needle)"));
        assert_eq!(params["needle"], "alpha");
        assert_eq!(params["limit"], 3);
    }

    #[tokio::test]
    async fn default_find_nodes_rejects_bad_label() {
        let store = RecordingStore {
            seen: Mutex::new(Vec::new()),
            rows: Vec::new(),
        };
        let err = store
            .find_nodes("Chunk`", "content", "x", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(store.seen.lock().unwrap().is_empty());
    }
}
