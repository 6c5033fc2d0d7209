//! Qdrant-backed vector store: `docs` (global) and `agent_<agent_id>`
//! (per-agent) collections.

use std::collections::HashMap;

use qdrant_client::qdrant::{
    CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde_json::Value;

use crate::RagError;

/// One candidate returned from a vector-store query.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub text: String,
    /// Cosine *distance* (`1 - cosine_similarity`, in `[0, 2]`), not similarity.
    pub distance: f32,
    pub metadata: HashMap<String, Value>,
}

/// The global documents collection name.
pub const GLOBAL_COLLECTION: &str = "docs";

pub fn agent_collection(agent_id: &str) -> String {
    format!("agent_{agent_id}")
}

pub struct VectorStore {
    client: Qdrant,
}

impl VectorStore {
    pub fn connect(url: &str) -> Result<Self, RagError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| RagError::Store(e.to_string()))?;
        Ok(Self { client })
    }

    /// Create `collection` if it doesn't already exist, sized for `dim`.
    pub async fn ensure_collection(&self, collection: &str, dim: u64) -> Result<(), RagError> {
        let exists = self
            .client
            .collection_info(collection)
            .await
            .is_ok();
        if exists {
            return Ok(());
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dim, Distance::Cosine)),
            )
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;
        Ok(())
    }

    /// `add(ids, documents, embeddings, metadatas?)`.
    pub async fn add(
        &self,
        collection: &str,
        ids: Vec<String>,
        documents: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Option<Vec<HashMap<String, Value>>>,
    ) -> Result<(), RagError> {
        let metadatas = metadatas.unwrap_or_else(|| vec![HashMap::new(); ids.len()]);
        let points: Vec<PointStruct> = ids
            .into_iter()
            .zip(documents)
            .zip(embeddings)
            .zip(metadatas)
            .map(|(((id, doc), embedding), meta)| {
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = meta
                    .into_iter()
                    .map(|(k, v)| (k, json_to_qdrant_value(v)))
                    .collect();
                payload.insert("text".to_string(), doc.into());
                PointStruct::new(id, embedding, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points))
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;
        Ok(())
    }

    /// `query(embeddings, n_results)`; returns candidates
    /// ordered by ascending distance (best first).
    pub async fn query(
        &self,
        collection: &str,
        embedding: Vec<f32>,
        n_results: u64,
    ) -> Result<Vec<ScoredPoint>, RagError> {
        let response = self
            .client
            .search_points(SearchPointsBuilder::new(collection, embedding, n_results).with_payload(true))
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|p| {
                let text = p
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str().map(|s| s.to_string()))
                    .unwrap_or_default();
                ScoredPoint {
                    id: p
                        .id
                        .and_then(|id| id.point_id_options)
                        .map(point_id_to_string)
                        .unwrap_or_default(),
                    text,
                    // Qdrant reports cosine similarity as its `score`; the
                    // cutoff logic here works in cosine-distance semantics.
                    distance: 1.0 - p.score,
                    metadata: HashMap::new(),
                }
            })
            .collect())
    }

    /// `delete(where)` — delete all points matching a filter.
    pub async fn delete(&self, collection: &str, filter: Filter) -> Result<(), RagError> {
        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(filter))
            .await
            .map_err(|e| RagError::Store(e.to_string()))?;
        Ok(())
    }

    pub async fn collection_exists(&self, collection: &str) -> bool {
        self.client.collection_info(collection).await.is_ok()
    }
}

fn json_to_qdrant_value(v: Value) -> qdrant_client::qdrant::Value {
    match v {
        Value::String(s) => s.into(),
        Value::Number(n) => n.as_f64().unwrap_or_default().into(),
        Value::Bool(b) => b.into(),
        other => other.to_string().into(),
    }
}

fn point_id_to_string(opt: qdrant_client::qdrant::point_id::PointIdOptions) -> String {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match opt {
        PointIdOptions::Num(n) => n.to_string(),
        PointIdOptions::Uuid(u) => u,
    }
}
