use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info};

use crate::{
    configuration::VectorIndexSettings,
    domain::entities::professor_match::{ProfessorMatch, ProfessorMetadata},
    ports::vector_index::{check_dimension, VectorIndex, VectorIndexError},
};

const PINECONE_API_VERSION: &str = "2024-07";

/// Professors reviews indexed in a Pinecone index, queried through its REST data plane
pub struct ProfessorPineconeRepository {
    client: reqwest::Client,
    query_url: String,
    api_key: Option<Secret<String>>,
    index_name: String,
    namespace: String,
    dimension: usize,
}

impl ProfessorPineconeRepository {
    pub fn new(client: reqwest::Client, settings: &VectorIndexSettings, dimension: usize) -> Self {
        Self {
            client,
            query_url: format!("{}/query", settings.url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            index_name: settings.index_name.clone(),
            namespace: settings.namespace.clone(),
            dimension,
        }
    }
}

#[async_trait]
impl VectorIndex for ProfessorPineconeRepository {
    #[tracing::instrument(
        name = "Querying Pinecone index",
        skip(self, vector),
        fields(index = %self.index_name, namespace = %self.namespace)
    )]
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<ProfessorMatch>, VectorIndexError> {
        check_dimension(self.dimension, vector)?;

        let body = QueryRequest {
            namespace: &self.namespace,
            vector,
            top_k,
            include_metadata,
            include_values: false,
        };

        let mut request = self
            .client
            .post(&self.query_url)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.header("Api-Key", api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| VectorIndexError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            debug!(%status, details, "Pinecone rejected the query");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    VectorIndexError::Unauthorized(format!("{}: {}", status, details))
                }
                _ => VectorIndexError::Unavailable(format!("{}: {}", status, details)),
            });
        }

        let response: QueryResponse = response
            .json()
            .await
            .map_err(|e| VectorIndexError::InvalidResponse(e.to_string()))?;

        let matches: Vec<ProfessorMatch> = response
            .matches
            .into_iter()
            .take(top_k)
            .map(ProfessorMatch::from)
            .collect();

        info!(nb_matches = matches.len(), "Queried professors");
        Ok(matches)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    metadata: Option<Map<String, JsonValue>>,
}

impl From<QueryMatch> for ProfessorMatch {
    fn from(query_match: QueryMatch) -> Self {
        Self {
            id: query_match.id,
            score: query_match.score,
            metadata: query_match
                .metadata
                .map(ProfessorMetadata::from_json_object)
                .unwrap_or_default(),
        }
    }
}
