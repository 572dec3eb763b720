use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub embedding: EmbeddingSettings,
    pub vector_index: VectorIndexSettings,
    pub completion: CompletionSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingSettings {
    pub model: EmbeddingModelKind,
    /// Directory holding a copy of the model converted for rust-bert (`rust_model.ot`,
    /// `config.json`, `modules.json`, tokenizer files...).
    /// Required by models rust-bert cannot download, used instead of the download otherwise.
    pub model_dir: Option<String>,
    /// Must match the dimension the vector index was populated with
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub dimension: usize,
    /// Number of embedding requests that can wait for the model runner
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub queue_capacity: usize,
}

/// Sentence embeddings models that can be loaded by the embedder.
///
/// Queries must be embedded with the model the index was populated with: `GteSmall` (`thenlper/gte-small`,
/// 384 dimensions, mean pooling, normalized) for the professors index.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingModelKind {
    /// Only loaded from `model_dir`: rust-bert does not host its weights
    GteSmall,
    AllMiniLmL12V2,
    AllMiniLmL6V2,
    AllDistilrobertaV1,
    ParaphraseAlbertSmallV2,
    SentenceT5Base,
    DistiluseBaseMultilingualCased,
    BertBaseNliMeanTokens,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorIndexSettings {
    pub backend: VectorIndexBackend,
    /// Pinecone: base URL of the index host. Qdrant: gRPC URL of the instance.
    pub url: String,
    pub api_key: Option<Secret<String>>,
    /// Pinecone index name, or Qdrant collection name
    pub index_name: String,
    pub namespace: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorIndexBackend {
    Pinecone,
    Qdrant,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionSettings {
    /// Base URL of an OpenAI-compatible API, without the `/chat/completions` suffix
    pub base_url: String,
    pub api_key: Secret<String>,
    pub model: String,
    pub temperature: Option<f32>,
}

impl CompletionSettings {
    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Extracts app settings from configuration files and env variables
///
/// `base.yaml` contains the settings shared by all environments.
/// `local.yaml` and `production.yaml` override them per environment, selected with `APP_ENVIRONMENT`
/// (`local` when unset).
///
/// Settings are then taken from environment variables, with a prefix of APP and '__' as separator.
/// For ex: `APP_COMPLETION__API_KEY=gsk_...` sets `Settings.completion.api_key`
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Foreign(Box::new(e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

/// The possible runtime environment for our application.
#[derive(Debug, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}
