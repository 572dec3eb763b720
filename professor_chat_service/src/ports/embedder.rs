use async_trait::async_trait;
use common::helper::error_chain_fmt;

use crate::domain::entities::embedding::Embedding;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Maps `text` to a unit-length vector
    async fn embed(&self, text: &str) -> Result<Embedding, EmbedderError>;
}

#[derive(thiserror::Error)]
pub enum EmbedderError {
    #[error("Cannot embed an empty text")]
    EmptyInput,
    #[error("Embeddings model could not be loaded: {0}")]
    ModelUnavailable(String),
    #[error("Embeddings model error: {0}")]
    Inference(String),
    #[error("Embeddings runner is not running anymore")]
    RunnerStopped,
}

impl std::fmt::Debug for EmbedderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
