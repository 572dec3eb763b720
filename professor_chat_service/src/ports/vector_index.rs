use async_trait::async_trait;
use common::helper::error_chain_fmt;

use crate::domain::entities::professor_match::ProfessorMatch;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns at most `top_k` professors, closest to `vector` first.
    ///
    /// Fewer than `top_k` results is not an error.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<ProfessorMatch>, VectorIndexError>;
}

/// Rejects a query vector that does not have the dimension the index was built with
pub fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), VectorIndexError> {
    if vector.len() != expected {
        return Err(VectorIndexError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

#[derive(thiserror::Error)]
pub enum VectorIndexError {
    #[error("Query vector has {actual} dimensions, the index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Vector index rejected the credentials: {0}")]
    Unauthorized(String),
    #[error("Vector index is unavailable: {0}")]
    Unavailable(String),
    #[error("Unexpected response from the vector index: {0}")]
    InvalidResponse(String),
}

impl std::fmt::Debug for VectorIndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
