//! Lightweight property graph kept in memory.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Metadata;
use crate::ports::graph_store::validate_identifier;
use crate::ports::{GraphNode, GraphRelationship, GraphStore, Record, Subgraph};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct GraphData {
    /// Nodes in insertion order
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
    /// Edges in insertion order
    edges: Vec<GraphRelationship>,
}

/// Graph store for tests and offline runs.
///
/// Subgraphs are breadth-first over edges in either direction; nodes and
/// relationships come back in insertion order with the center node first.
/// Cypher is not interpreted.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    data: RwLock<GraphData>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn node_count(&self) -> usize {
        self.data.read().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.data.read().await.edges.len()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn add_node(&self, label: &str, mut properties: Metadata) -> Result<String> {
        validate_identifier(label)?;

        let id = match properties.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        properties.insert("id".into(), json!(id));

        let mut data = self.data.write().await;
        let node = GraphNode {
            id: id.clone(),
            labels: vec![label.to_string()],
            properties,
        };

        match data.index.get(&id) {
            Some(&pos) => data.nodes[pos] = node,
            None => {
                let pos = data.nodes.len();
                data.nodes.push(node);
                data.index.insert(id.clone(), pos);
            }
        }

        Ok(id)
    }

    async fn add_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
        properties: Metadata,
    ) -> Result<()> {
        validate_identifier(relation_type)?;

        let mut data = self.data.write().await;
        for id in [source_id, target_id] {
            if !data.index.contains_key(id) {
                return Err(Error::NotFound(format!("graph node {}", id)));
            }
        }

        data.edges.push(GraphRelationship {
            relation_type: relation_type.to_string(),
            start: source_id.to_string(),
            end: target_id.to_string(),
            properties,
        });
        Ok(())
    }

    async fn query(&self, _cypher: &str, _parameters: Metadata) -> Result<Vec<Record>> {
        Err(Error::InvalidQuery(
            "in-memory graph store does not execute Cypher".to_string(),
        ))
    }

    async fn get_subgraph(&self, node_id: &str, depth: usize) -> Result<Subgraph> {
        let data = self.data.read().await;
        if !data.index.contains_key(node_id) {
            return Ok(Subgraph::default());
        }

        let mut distance: HashMap<&str, usize> = HashMap::new();
        let mut used_edges: HashSet<usize> = HashSet::new();
        let mut queue = VecDeque::new();

        distance.insert(node_id, 0);
        queue.push_back(node_id);

        while let Some(current) = queue.pop_front() {
            let hops = distance[current];
            if hops >= depth {
                continue;
            }

            for (pos, edge) in data.edges.iter().enumerate() {
                let neighbour = if edge.start == current {
                    edge.end.as_str()
                } else if edge.end == current {
                    edge.start.as_str()
                } else {
                    continue;
                };

                used_edges.insert(pos);
                if !distance.contains_key(neighbour) {
                    distance.insert(neighbour, hops + 1);
                    queue.push_back(neighbour);
                }
            }
        }

        let center = data.index[node_id];
        let mut nodes = vec![data.nodes[center].clone()];
        nodes.extend(
            data.nodes
                .iter()
                .filter(|n| n.id != node_id && distance.contains_key(n.id.as_str()))
                .cloned(),
        );

        let relationships = data
            .edges
            .iter()
            .enumerate()
            .filter(|(pos, _)| used_edges.contains(pos))
            .map(|(_, edge)| edge.clone())
            .collect();

        Ok(Subgraph {
            nodes,
            relationships,
        })
    }

    async fn find_nodes(
        &self,
        label: &str,
        property: &str,
        needle: &str,
        limit: usize,
    ) -> Result<Vec<GraphNode>> {
        validate_identifier(label)?;
        validate_identifier(property)?;

        let needle = needle.to_lowercase();
        let data = self.data.read().await;

        Ok(data
            .nodes
            .iter()
            .filter(|n| n.labels.iter().any(|l| l == label))
            .filter(|n| n.property_str(property).to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }
}
