use async_trait::async_trait;
use common::helper::error_chain_fmt;
use qdrant_client::{
    prelude::{QdrantClient, QdrantClientConfig},
    qdrant::{
        point_id::PointIdOptions, value::Kind, Condition, Filter, PointId, ScoredPoint,
        SearchPoints, Value as QdrantValue,
    },
};
use secrecy::ExposeSecret;
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::HashMap;
use tracing::info;

use crate::{
    configuration::VectorIndexSettings,
    domain::entities::professor_match::{ProfessorMatch, ProfessorMetadata},
    ports::vector_index::{check_dimension, VectorIndex, VectorIndexError},
};

/// Payload field holding the professor name, as Qdrant point ids can only be integers or UUIDs
const PROFESSOR_FIELD: &str = "professor";
/// Payload field used to partition a collection like a Pinecone namespace
const NAMESPACE_FIELD: &str = "namespace";

/// Professors reviews indexed in a Qdrant collection
pub struct ProfessorQdrantRepository {
    client: QdrantClient,
    collection_name: String,
    namespace: String,
    dimension: usize,
}

impl ProfessorQdrantRepository {
    /// The collection is expected to exist already: this service only reads from it
    pub fn try_new(
        settings: &VectorIndexSettings,
        dimension: usize,
    ) -> Result<Self, ProfessorQdrantRepositoryError> {
        let mut qdrant_config = QdrantClientConfig::from_url(&settings.url);
        if let Some(api_key) = &settings.api_key {
            qdrant_config.set_api_key(api_key.expose_secret());
        }

        let client = QdrantClient::new(Some(qdrant_config))
            .map_err(|e| ProfessorQdrantRepositoryError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            collection_name: settings.index_name.clone(),
            namespace: settings.namespace.clone(),
            dimension,
        })
    }
}

#[async_trait]
impl VectorIndex for ProfessorQdrantRepository {
    #[tracing::instrument(
        name = "Searching Qdrant collection",
        skip(self, vector),
        fields(collection = %self.collection_name, namespace = %self.namespace)
    )]
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<ProfessorMatch>, VectorIndexError> {
        check_dimension(self.dimension, vector)?;

        let response = self
            .client
            .search_points(&SearchPoints {
                collection_name: self.collection_name.clone(),
                vector: vector.to_vec(),
                filter: Some(Filter::must([Condition::matches(
                    NAMESPACE_FIELD,
                    self.namespace.clone(),
                )])),
                limit: top_k as u64,
                // The professor name is in the payload
                with_payload: Some(true.into()),
                ..Default::default()
            })
            .await
            // Qdrant client only returns anyhow errors
            .map_err(|e| classify_error(e.to_string()))?;

        let matches: Vec<ProfessorMatch> = response
            .result
            .into_iter()
            .map(|point| professor_from_point(point, include_metadata))
            .collect();

        info!(nb_matches = matches.len(), "Queried professors");
        Ok(matches)
    }
}

fn classify_error(message: String) -> VectorIndexError {
    if message.contains("Unauthenticated") || message.contains("PermissionDenied") {
        VectorIndexError::Unauthorized(message)
    } else {
        VectorIndexError::Unavailable(message)
    }
}

fn professor_from_point(point: ScoredPoint, include_metadata: bool) -> ProfessorMatch {
    let mut payload = json_object_from_payload(point.payload);
    payload.remove(NAMESPACE_FIELD);

    let id = match payload.remove(PROFESSOR_FIELD) {
        Some(JsonValue::String(name)) => name,
        _ => point.id.map(point_id_to_string).unwrap_or_default(),
    };

    ProfessorMatch {
        id,
        score: Some(point.score),
        metadata: if include_metadata {
            ProfessorMetadata::from_json_object(payload)
        } else {
            ProfessorMetadata::default()
        },
    }
}

fn point_id_to_string(id: PointId) -> String {
    match id.point_id_options {
        Some(PointIdOptions::Num(num)) => num.to_string(),
        Some(PointIdOptions::Uuid(uuid)) => uuid,
        None => String::new(),
    }
}

fn json_object_from_payload(payload: HashMap<String, QdrantValue>) -> Map<String, JsonValue> {
    payload
        .into_iter()
        .map(|(key, value)| (key, json_from_qdrant_value(value)))
        .collect()
}

fn json_from_qdrant_value(value: QdrantValue) -> JsonValue {
    match value.kind {
        None | Some(Kind::NullValue(_)) => JsonValue::Null,
        Some(Kind::BoolValue(value)) => JsonValue::Bool(value),
        Some(Kind::IntegerValue(value)) => JsonValue::Number(value.into()),
        Some(Kind::DoubleValue(value)) => Number::from_f64(value)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Some(Kind::StringValue(value)) => JsonValue::String(value),
        Some(Kind::ListValue(list)) => {
            JsonValue::Array(list.values.into_iter().map(json_from_qdrant_value).collect())
        }
        Some(Kind::StructValue(object)) => {
            JsonValue::Object(json_object_from_payload(object.fields))
        }
    }
}

#[derive(thiserror::Error)]
pub enum ProfessorQdrantRepositoryError {
    #[error("Error from Qdrant client: {0}")]
    ClientError(String),
}

impl std::fmt::Debug for ProfessorQdrantRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
