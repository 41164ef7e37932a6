//! Enrolled identity gallery contract.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::analyzer::FaceAttributes;
use crate::recognizer::Embedding;

/// One enrolled person.
#[derive(Debug, Clone)]
pub struct EnrolledIdentity {
    pub id: String,
    pub name: String,
    pub embedding: Embedding,
    /// Attributes captured at enrollment time, if any.
    pub metadata: Option<FaceAttributes>,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("empty embedding")]
    EmptyEmbedding,
    #[error("invalid embedding value (NaN/Inf)")]
    InvalidEmbeddingValue,
    #[error("store backend error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Validation every store applies before persisting an embedding. Vectors
/// of any dimension are accepted as long as the values are usable.
pub fn validate_embedding(embedding: &Embedding) -> Result<(), StoreError> {
    if embedding.is_empty() {
        return Err(StoreError::EmptyEmbedding);
    }
    if !embedding.all_finite() {
        return Err(StoreError::InvalidEmbeddingValue);
    }
    Ok(())
}

/// Persistent gallery of enrolled identities.
pub trait EnrollmentStore {
    /// Full gallery snapshot.
    fn get_all(&self) -> Result<Vec<EnrolledIdentity>, StoreError>;

    /// Persist a new identity; returns its id.
    fn add(
        &mut self,
        name: &str,
        embedding: &Embedding,
        metadata: Option<&FaceAttributes>,
    ) -> Result<String, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty() {
        let err = validate_embedding(&Embedding::new(vec![])).unwrap_err();
        assert!(matches!(err, StoreError::EmptyEmbedding));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let err = validate_embedding(&Embedding::new(vec![0.5, f32::NAN])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidEmbeddingValue));
    }

    #[test]
    fn test_validate_accepts_any_dimension() {
        assert!(validate_embedding(&Embedding::new(vec![1.0])).is_ok());
        assert!(validate_embedding(&Embedding::new(vec![0.0; 512])).is_ok());
    }
}
