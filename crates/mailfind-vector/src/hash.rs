//! Feature-hashing embedding backend.
//!
//! Always available and fully deterministic: the same text produces a
//! bit-identical vector on every call and every machine. Text goes
//! through the shared analyzer, so "Meetings" and "meeting" land in the
//! same slots.

use async_trait::async_trait;
use mailfind_core::{Analyzer, Error, Result};

use crate::embedding::EmbeddingProvider;
use crate::similarity::l2_normalize;

/// Dimension used when none is configured.
pub const DEFAULT_HASH_DIMENSION: usize = 256;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;
const SLOTS_PER_FEATURE: usize = 2;

/// Hashes analyzed unigrams and bigrams into a fixed-size vector.
#[derive(Clone)]
pub struct HashEmbeddingProvider {
    dimension: usize,
    analyzer: Analyzer,
    name: String,
}

impl HashEmbeddingProvider {
    /// Create a hash backend; `dimension` must be positive.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::config("hash embedding dimension must be positive"));
        }
        Ok(Self {
            dimension,
            analyzer: Analyzer::english(),
            name: format!("hash:{dimension}"),
        })
    }

    /// Compute the embedding synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let terms = self.analyzer.terms(text);
        let mut acc = vec![0.0f32; self.dimension];

        for term in &terms {
            self.add_feature(&mut acc, term, UNIGRAM_WEIGHT);
        }
        for pair in terms.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut acc, &bigram, BIGRAM_WEIGHT);
        }

        l2_normalize(&mut acc);
        acc
    }

    fn add_feature(&self, acc: &mut [f32], feature: &str, weight: f32) {
        let digest = blake3::hash(feature.as_bytes());
        for chunk in digest.as_bytes().chunks_exact(4).take(SLOTS_PER_FEATURE) {
            let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            acc[value as usize % self.dimension] += weight;
        }
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_HASH_DIMENSION,
            analyzer: Analyzer::english(),
            name: format!("hash:{DEFAULT_HASH_DIMENSION}"),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for HashEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashEmbeddingProvider")
            .field("dimension", &self.dimension)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;

    #[test]
    fn test_name_and_dimension() {
        let provider = HashEmbeddingProvider::new(64).unwrap();
        assert_eq!(provider.name(), "hash:64");
        assert_eq!(provider.dimension(), 64);
        assert_eq!(HashEmbeddingProvider::default().name(), "hash:256");
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let err = HashEmbeddingProvider::new(0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_deterministic() {
        let a = HashEmbeddingProvider::new(128).unwrap();
        let b = HashEmbeddingProvider::new(128).unwrap();
        let text = "Quarterly budget review for the March planning meeting";
        let first = a.embed(text).await.unwrap();
        let second = a.embed(text).await.unwrap();
        let other_instance = b.embed(text).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, other_instance);
    }

    #[test]
    fn test_unit_norm() {
        let provider = HashEmbeddingProvider::new(32).unwrap();
        let v = provider.embed_text("invoice attached for march");
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let provider = HashEmbeddingProvider::new(16).unwrap();
        assert_eq!(provider.embed_text(""), vec![0.0; 16]);
        assert_eq!(provider.embed_text("the of and"), vec![0.0; 16]);
    }

    #[test]
    fn test_inflections_share_features() {
        let provider = HashEmbeddingProvider::new(256).unwrap();
        let a = provider.embed_text("Meetings");
        let b = provider.embed_text("meeting");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_related_text_is_closer() {
        let provider = HashEmbeddingProvider::new(256).unwrap();
        let query = provider.embed_text("budget review");
        let related = provider.embed_text("the quarterly budget review is ready");
        let unrelated = provider.embed_text("holiday party photos");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_batch_matches_single() {
        let provider = HashEmbeddingProvider::new(32).unwrap();
        let batch = provider.embed_batch(&["one", "two"]).await.unwrap();
        assert_eq!(batch[1], provider.embed_text("two"));
    }
}
