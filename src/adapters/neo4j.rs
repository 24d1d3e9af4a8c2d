//! Graph store backed by Neo4j

use async_trait::async_trait;
use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString,
    BoltType, Graph, Node, Query,
};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::Metadata;
use crate::ports::graph_store::validate_identifier;
use crate::ports::{GraphNode, GraphRelationship, GraphStore, Record, Subgraph};
use crate::{Error, Result};

pub const DEFAULT_URI: &str = "bolt://localhost:7687";
pub const DEFAULT_USER: &str = "neo4j";

pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    /// Connect to Neo4j server
    pub async fn new(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password).await?;
        info!("Connected to Neo4j at {}", uri);

        Ok(Self { graph })
    }

    /// Connect using environment variables
    pub async fn from_env() -> Result<Self> {
        let uri = std::env::var("NEO4J_URI").unwrap_or_else(|_| DEFAULT_URI.to_string());
        let user = std::env::var("NEO4J_USER").unwrap_or_else(|_| DEFAULT_USER.to_string());
        let password = std::env::var("NEO4J_PASSWORD")
            .map_err(|_| Error::InvalidConfig("NEO4J_PASSWORD not set".to_string()))?;

        Self::new(&uri, &user, &password).await
    }

    async fn fetch(&self, q: Query) -> Result<Vec<neo4rs::Row>> {
        let mut result = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = result.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn add_node(&self, label: &str, mut properties: Metadata) -> Result<String> {
        validate_identifier(label)?;

        if !properties.contains_key("id") {
            properties.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        }

        let cypher = format!("CREATE (n:{label}) SET n = $props RETURN n.id AS id");
        let q = query(&cypher).param("props", metadata_to_bolt(&properties));

        let rows = self.fetch(q).await?;
        let id = rows
            .first()
            .and_then(|row| row.get::<String>("id").ok())
            .ok_or_else(|| Error::UpstreamFailure("Neo4j did not return node id".to_string()))?;

        debug!("Created node {} with label {}", id, label);
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

        let cypher = format!(
            "MATCH (a {{id: $source_id}}), (b {{id: $target_id}})
             CREATE (a)-[r:{relation_type}]->(b)
             SET r = $props
             RETURN type(r) AS type"
        );
        let q = query(&cypher)
            .param("source_id", source_id)
            .param("target_id", target_id)
            .param("props", metadata_to_bolt(&properties));

        if self.fetch(q).await?.is_empty() {
            return Err(Error::NotFound(format!(
                "graph nodes {} -> {}",
                source_id, target_id
            )));
        }

        debug!("Created edge {} -[{}]-> {}", source_id, relation_type, target_id);
        Ok(())
    }

    async fn query(&self, cypher: &str, parameters: Metadata) -> Result<Vec<Record>> {
        let q = parameters
            .iter()
            .fold(query(cypher), |q, (key, value)| {
                q.param(key, json_to_bolt(value))
            });

        self.fetch(q)
            .await?
            .iter()
            .map(|row| {
                row.to::<Record>()
                    .map_err(|e| Error::SerializationError(format!("Neo4j row: {}", e)))
            })
            .collect()
    }

    async fn get_subgraph(&self, node_id: &str, depth: usize) -> Result<Subgraph> {
        let nodes_query = query(&format!(
            "MATCH (c {{id: $node_id}})-[*0..{depth}]-(m)
             RETURN DISTINCT m"
        ))
        .param("node_id", node_id);

        let mut nodes: Vec<GraphNode> = self
            .fetch(nodes_query)
            .await?
            .iter()
            .filter_map(|row| row.get::<Node>("m").ok())
            .filter_map(|node| node_to_graph_node(&node))
            .collect();

        // Center node first, the rest in the order Neo4j returned them
        if let Some(pos) = nodes.iter().position(|n| n.id == node_id) {
            let center = nodes.remove(pos);
            nodes.insert(0, center);
        }

        if depth == 0 || nodes.is_empty() {
            return Ok(Subgraph {
                nodes,
                relationships: Vec::new(),
            });
        }

        let rels_query = query(&format!(
            "MATCH path = (c {{id: $node_id}})-[*1..{depth}]-(m)
             UNWIND relationships(path) AS r
             WITH DISTINCT r
             RETURN type(r) AS type,
                    startNode(r).id AS start,
                    endNode(r).id AS end,
                    properties(r) AS properties"
        ))
        .param("node_id", node_id);

        let relationships = self
            .fetch(rels_query)
            .await?
            .iter()
            .filter_map(|row| {
                Some(GraphRelationship {
                    relation_type: row.get::<String>("type").ok()?,
                    start: row.get::<String>("start").ok()?,
                    end: row.get::<String>("end").ok()?,
                    properties: row.get::<Metadata>("properties").unwrap_or_default(),
                })
            })
            .collect();

        Ok(Subgraph {
            nodes,
            relationships,
        })
    }
}

fn node_to_graph_node(node: &Node) -> Option<GraphNode> {
    let properties: Metadata = node.to().ok()?;
    let id = match properties.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => node.id().to_string(),
    };

    Some(GraphNode {
        id,
        labels: node.labels().iter().map(|l| l.to_string()).collect(),
        properties,
    })
}

fn metadata_to_bolt(map: &Metadata) -> BoltType {
    let mut bolt = BoltMap::new();
    for (key, value) in map {
        bolt.put(BoltString::new(key), json_to_bolt(value));
    }
    BoltType::Map(bolt)
}

/// Convert JSON parameters to Bolt values.
fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or_default())),
        },
        Value::String(s) => BoltType::String(BoltString::new(s)),
        Value::Array(items) => {
            BoltType::List(BoltList::from(items.iter().map(json_to_bolt).collect::<Vec<_>>()))
        }
        Value::Object(map) => metadata_to_bolt(map),
    }
}
