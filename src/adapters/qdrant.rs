//! Vector store backed by Qdrant

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::quantization_config::Quantization;
use qdrant_client::qdrant::r#match::MatchValue as QdrantMatchValue;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    BinaryQuantizationBuilder, CompressionRatio, CreateCollectionBuilder, Distance,
    FieldCondition, Filter, ListValue, Match, PointId, PointStruct, ProductQuantizationBuilder,
    QuantizationSearchParamsBuilder, SearchParamsBuilder, SearchPointsBuilder, Struct,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{
    Chunk, ChunkType, Metadata, QuantizationConfig, QuantizationType, RetrievalResult,
};
use crate::ports::{MatchValue, SearchFilter, VectorStore};
use crate::{Error, Result};

/// Payload key holding the chunk id when it is not a UUID.
const CHUNK_ID_KEY: &str = "chunk_id";
const CONTENT_KEY: &str = "content";
const CHUNK_TYPE_KEY: &str = "chunk_type";
const SOURCE_DOCUMENT_KEY: &str = "source_document_id";

pub struct QdrantStore {
    client: Qdrant,
    /// Quantization requested per collection, consulted for search rescoring
    quantization: RwLock<HashMap<String, QuantizationConfig>>,
}

impl QdrantStore {
    /// Connect to Qdrant server
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build()?;

        Ok(Self {
            client,
            quantization: RwLock::new(HashMap::new()),
        })
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let collections = self.client.list_collections().await?;
        Ok(collections.collections.iter().any(|c| c.name == name))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        quantization: &QuantizationConfig,
    ) -> Result<()> {
        if dimension == 0 {
            return Err(Error::InvalidConfig(
                "collection dimension must be positive".to_string(),
            ));
        }

        self.quantization
            .write()
            .await
            .insert(name.to_string(), *quantization);

        if self.collection_exists(name).await? {
            debug!("Collection '{}' already exists", name);
            return Ok(());
        }

        info!(
            "Creating collection '{}' (dim={}, quantization={:?})",
            name, dimension, quantization.kind
        );

        self.client
            .create_collection(collection_request(name, dimension, quantization))
            .await?;

        info!("Collection created successfully");
        Ok(())
    }

    async fn insert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        let points = chunks
            .iter()
            .map(chunk_to_point)
            .collect::<Result<Vec<_>>>()?;

        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        debug!("Upserting {} points to Qdrant", count);

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await?;

        info!("Successfully upserted {} chunks into '{}'", count, collection);
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut search_builder =
            SearchPointsBuilder::new(collection, query_vector.to_vec(), limit as u64)
                .with_payload(true);

        if let Some(f) = filter.filter(|f| !f.is_empty()) {
            search_builder = search_builder.filter(into_qdrant_filter(f));
        }

        let quantization = self.quantization.read().await.get(collection).copied();
        if let Some(q) = quantization.filter(|q| q.kind != QuantizationType::None) {
            search_builder = search_builder.params(
                SearchParamsBuilder::default()
                    .quantization(QuantizationSearchParamsBuilder::default().rescore(q.rescore)),
            );
        }

        let results = self.client.search_points(search_builder).await?;

        let search_results = results
            .result
            .into_iter()
            .map(|point| {
                let id = point.id.and_then(point_id_string);
                let chunk = payload_to_chunk(point.payload, id);
                RetrievalResult::new(chunk, point.score as f64, "vector")
            })
            .collect();

        Ok(search_results)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.client.delete_collection(name).await?;
        self.quantization.write().await.remove(name);
        info!("Deleted collection '{}'", name);
        Ok(())
    }
}

fn collection_request(
    name: &str,
    dimension: usize,
    quantization: &QuantizationConfig,
) -> CreateCollectionBuilder {
    let builder = CreateCollectionBuilder::new(name)
        .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine));

    match quantization_for(quantization) {
        Some(config) => builder.quantization_config(config),
        None => builder,
    }
}

fn quantization_for(config: &QuantizationConfig) -> Option<Quantization> {
    match config.kind {
        QuantizationType::None => None,
        QuantizationType::Binary => Some(Quantization::Binary(
            BinaryQuantizationBuilder::new(config.always_ram).build(),
        )),
        QuantizationType::Product => Some(Quantization::Product(
            ProductQuantizationBuilder::new(CompressionRatio::X16.into())
                .always_ram(config.always_ram)
                .build(),
        )),
    }
}

/// Qdrant point ids must be UUIDs or integers. Other chunk ids map to a
/// stable UUIDv5 and travel in the payload.
fn point_id_for(chunk_id: &str) -> String {
    match Uuid::parse_str(chunk_id) {
        Ok(uuid) => uuid.to_string(),
        Err(_) => Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string(),
    }
}

fn point_id_string(id: PointId) -> Option<String> {
    match id.point_id_options? {
        PointIdOptions::Uuid(uuid) => Some(uuid),
        PointIdOptions::Num(num) => Some(num.to_string()),
    }
}

fn chunk_to_point(chunk: &Chunk) -> Result<PointStruct> {
    let embedding = chunk.embedding.as_ref().ok_or_else(|| {
        Error::InvalidQuery(format!("chunk {} has no embedding", chunk.id))
    })?;

    let mut payload: HashMap<String, QdrantValue> = chunk
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), json_to_qdrant(v)))
        .collect();
    payload.insert(CONTENT_KEY.into(), chunk.content.clone().into());
    payload.insert(CHUNK_TYPE_KEY.into(), chunk.chunk_type.as_str().into());
    payload.insert(
        SOURCE_DOCUMENT_KEY.into(),
        chunk.source_document_id.clone().into(),
    );
    payload.insert(CHUNK_ID_KEY.into(), chunk.id.clone().into());

    Ok(PointStruct::new(
        point_id_for(&chunk.id),
        embedding.clone(),
        payload,
    ))
}

fn payload_to_chunk(mut payload: HashMap<String, QdrantValue>, point_id: Option<String>) -> Chunk {
    let mut take_str = |key: &str| match payload.remove(key).and_then(|v| v.kind) {
        Some(Kind::StringValue(s)) => Some(s),
        _ => None,
    };

    let chunk_id = take_str(CHUNK_ID_KEY);
    let content = take_str(CONTENT_KEY).unwrap_or_default();
    let chunk_type = take_str(CHUNK_TYPE_KEY)
        .map(|t| ChunkType::parse(&t))
        .unwrap_or(ChunkType::Text);
    let source_document_id = take_str(SOURCE_DOCUMENT_KEY).unwrap_or_default();

    let id = chunk_id
        .or(point_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let metadata: Metadata = payload
        .into_iter()
        .map(|(k, v)| (k, qdrant_to_json(v)))
        .collect();

    Chunk::with_id(id, content, chunk_type, source_document_id).with_metadata(metadata)
}

fn into_qdrant_filter(filter: &SearchFilter) -> Filter {
    let conditions: Vec<_> = filter
        .must
        .iter()
        .map(|condition| {
            let match_value = match &condition.value {
                MatchValue::Keyword(s) => QdrantMatchValue::Keyword(s.clone()),
                MatchValue::Integer(i) => QdrantMatchValue::Integer(*i),
                MatchValue::Bool(b) => QdrantMatchValue::Boolean(*b),
            };
            FieldCondition {
                key: condition.key.clone(),
                r#match: Some(Match {
                    match_value: Some(match_value),
                }),
                ..Default::default()
            }
            .into()
        })
        .collect();

    Filter::must(conditions)
}

fn json_to_qdrant(value: &Value) -> QdrantValue {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(json_to_qdrant).collect(),
        }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_qdrant(v)))
                .collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

fn qdrant_to_json(value: QdrantValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(qdrant_to_json).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_to_json(v)))
                .collect(),
        ),
    }
}
