//! FastEmbed embedding provider.
//!
//! Wraps the `fastembed` crate to provide local embedding generation
//! via pre-trained models (e.g., BGE-small, AllMiniLM). Models are only
//! loaded from the local cache; this provider never downloads.
//!
//! # Thread Safety
//!
//! `fastembed::TextEmbedding` is not `Send + Sync`, so we wrap it in
//! `Arc<Mutex<>>` and use `tokio::task::spawn_blocking` for embedding calls.
//!
//! # Feature Gate
//!
//! This module requires the `model-fastembed` feature.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mailfind_core::{Error, Result};

use crate::embedding::EmbeddingProvider;
use crate::selection::cached_model_dir;

/// Map a model name string to a fastembed `EmbeddingModel` enum variant.
fn resolve_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        other => Err(Error::config(format!(
            "Unknown embedding model: '{other}'. Supported: bge-small-en-v1.5, all-minilm-l6-v2, bge-base-en-v1.5, bge-large-en-v1.5"
        ))),
    }
}

/// FastEmbed-based embedding provider.
///
/// # Supported Models
///
/// | Name | Dimension |
/// |------|-----------|
/// | `bge-small-en-v1.5` | 384 |
/// | `all-minilm-l6-v2` | 384 |
/// | `bge-base-en-v1.5` | 768 |
/// | `bge-large-en-v1.5` | 1024 |
pub struct FastEmbedProvider {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    dimension: usize,
    name: String,
}

impl FastEmbedProvider {
    /// Load `model_name` from `cache_dir`.
    ///
    /// Fails with `BackendUnavailable` when the model files are not
    /// already cached.
    pub fn new(model_name: &str, cache_dir: &Path) -> Result<Self> {
        let model_enum = resolve_model(model_name)?;

        let cached = cached_model_dir(cache_dir, model_name)?;
        if !cached.is_dir() {
            return Err(Error::backend_unavailable(format!(
                "model '{model_name}' is not in the local cache ({})",
                cached.display()
            )));
        }

        let init = fastembed::InitOptions::new(model_enum)
            .with_cache_dir(cache_dir.to_path_buf())
            .with_show_download_progress(false);

        let mut text_embedding = fastembed::TextEmbedding::try_new(init).map_err(|e| {
            Error::backend_unavailable(format!("Failed to load model '{model_name}': {e}"))
        })?;

        // Dimension comes from a sample embedding
        let sample = text_embedding
            .embed(vec!["dimension check"], None)
            .map_err(|e| Error::operation(format!("Failed to detect embedding dimension: {e}")))?;

        let dimension = sample
            .first()
            .map(|v| v.len())
            .ok_or_else(|| Error::operation("Empty sample embedding"))?;

        log::info!("Loaded embedding model {model_name} ({dimension} dimensions)");

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            dimension,
            name: format!("model:{model_name}"),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.model.clone();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| Error::operation(format!("Mutex poisoned: {e}")))?;
            let results = model
                .embed(vec![text], None)
                .map_err(|e| Error::operation(format!("Embedding failed: {e}")))?;
            results
                .into_iter()
                .next()
                .ok_or_else(|| Error::operation("No embedding returned"))
        })
        .await
        .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))?
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();

        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| Error::operation(format!("Mutex poisoned: {e}")))?;
            model
                .embed(texts, None)
                .map_err(|e| Error::operation(format!("Batch embedding failed: {e}")))
        })
        .await
        .map_err(|e| Error::operation(format!("spawn_blocking failed: {e}")))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("name", &self.name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
