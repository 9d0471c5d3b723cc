//! Embedding provider trait and the deadline wrapper.
//!
//! This module defines the `EmbeddingProvider` trait that abstracts over
//! embedding backends. The active provider's [`name`](EmbeddingProvider::name)
//! is stored with every vector, so vectors from different backends are
//! never compared.
//!
//! # Providers
//!
//! - `HashEmbeddingProvider`: Deterministic feature hashing, always available
//! - `FastEmbedProvider`: Local model via fastembed (requires `model-fastembed` feature)

use std::time::Duration;

use async_trait::async_trait;
use mailfind_core::{Error, Result};

/// Trait for generating text embeddings.
///
/// Implementations must be deterministic for a given instance: the same
/// text always produces the same vector. The trait requires `Send + Sync`
/// so one provider can serve concurrent embedding tasks.
///
/// # Thread Safety
///
/// Implementations should handle internal synchronization (e.g., `Arc<Mutex<>>`)
/// for thread-unsafe underlying libraries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    /// Backends that support native batching should override this.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// The embedding dimension.
    fn dimension(&self) -> usize;

    /// Backend name stored alongside vectors (e.g., `hash:256`).
    fn name(&self) -> &str;
}

/// Embed `text`, failing with `Timeout` if it takes longer than `timeout`.
///
/// The provider call is cancelled when the deadline passes or when the
/// returned future is dropped. A vector whose length differs from the
/// provider's dimension is rejected as `InvalidData`.
pub async fn embed_with_deadline(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f32>> {
    let vector = match tokio::time::timeout(timeout, provider.embed(text)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(Error::timeout(
                format!("embedding with {}", provider.name()),
                timeout,
            ));
        }
    };
    if vector.len() != provider.dimension() {
        return Err(Error::invalid_data(format!(
            "{} returned {} values, expected {}",
            provider.name(),
            vector.len(),
            provider.dimension()
        )));
    }
    Ok(vector)
}

// ============================================================================
// Tests
// ============================================================================
