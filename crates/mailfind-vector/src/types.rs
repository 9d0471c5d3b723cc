//! Common types for the vector store.

use chrono::{DateTime, Utc};
use mailfind_core::{Error, Ranked, Result};
use serde::Serialize;

/// The embedding of one message under one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageVector {
    pub message_id: String,
    /// Name of the backend that produced the vector (e.g., `hash:256`).
    pub backend: String,
    pub dimension: usize,
    pub vector: Vec<f32>,
}

impl MessageVector {
    /// Create a vector record; the dimension is taken from `vector`.
    pub fn new(message_id: impl Into<String>, backend: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            message_id: message_id.into(),
            backend: backend.into(),
            dimension: vector.len(),
            vector,
        }
    }

    /// Reject empty vectors and a dimension that disagrees with the data.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::invalid_data(format!(
                "vector for {} has dimension 0",
                self.message_id
            )));
        }
        if self.vector.len() != self.dimension {
            return Err(Error::invalid_data(format!(
                "vector for {} has {} values but dimension {}",
                self.message_id,
                self.vector.len(),
                self.dimension
            )));
        }
        Ok(())
    }
}

/// One semantic match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticHit {
    pub message_id: String,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
    pub date: Option<DateTime<Utc>>,
}

impl Ranked for SemanticHit {
    fn rank_score(&self) -> f32 {
        self.score
    }

    fn rank_date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    fn rank_id(&self) -> &str {
        &self.message_id
    }
}

/// Stored vectors per backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendCount {
    pub backend: String,
    pub count: u64,
    pub dimension: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_takes_dimension_from_vector() {
        let v = MessageVector::new("m1", "hash:3", vec![0.1, 0.2, 0.3]);
        assert_eq!(v.dimension, 3);
        assert!(v.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_and_mismatch() {
        let empty = MessageVector::new("m1", "hash:3", vec![]);
        assert!(matches!(empty.validate(), Err(Error::InvalidData(_))));

        let mut wrong = MessageVector::new("m1", "hash:3", vec![0.1, 0.2, 0.3]);
        wrong.dimension = 4;
        assert!(matches!(wrong.validate(), Err(Error::InvalidData(_))));
    }
}
