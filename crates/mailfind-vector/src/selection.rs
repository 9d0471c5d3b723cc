//! Embedding configuration and backend selection.
//!
//! Selection runs once per session. A requested model that cannot be
//! loaded from the local cache either falls back to the hash backend,
//! with the reason recorded in [`BackendSelection::fallback`], or fails
//! with `BackendUnavailable`. The fallback is never silent.
//!
//! # Selectors
//!
//! | Selector | Meaning |
//! |----------|---------|
//! | `hash` | Hash backend with `hash_dimension` |
//! | `hash:<dim>` | Hash backend with an explicit dimension |
//! | `model:<name>` | Local fastembed model |
//! | `auto` | The configured model if cached, else hash |

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mailfind_core::util::paths::expand_path;
use mailfind_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;
use crate::hash::{DEFAULT_HASH_DIMENSION, HashEmbeddingProvider};

/// Cache directory fastembed uses when none is configured.
const FASTEMBED_DEFAULT_CACHE: &str = ".fastembed_cache";

// ============================================================================
// Configuration
// ============================================================================

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Whether embeddings are generated and semantic search is offered.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Backend selector: `auto`, `hash`, `hash:<dim>`, `model:<name>`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Model used by `auto` and bare `model` (e.g., "bge-small-en-v1.5").
    #[serde(default = "default_model")]
    pub model: String,

    /// Dimension of the hash backend when the selector gives none.
    #[serde(default = "default_hash_dimension")]
    pub hash_dimension: usize,

    /// Directory holding cached models.
    pub cache_dir: Option<String>,

    /// Fall back to hash when an explicitly requested model is unavailable.
    #[serde(default = "default_true")]
    pub fallback_to_hash: bool,

    /// Deadline for one embedding call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Records per ingest chunk.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent embedding calls during ingest.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_true() -> bool {
    true
}

fn default_backend() -> String {
    "auto".to_string()
}

fn default_model() -> String {
    "bge-small-en-v1.5".to_string()
}

fn default_hash_dimension() -> usize {
    DEFAULT_HASH_DIMENSION
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_batch_size() -> usize {
    64
}

fn default_concurrency() -> usize {
    4
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            backend: default_backend(),
            model: default_model(),
            hash_dimension: default_hash_dimension(),
            cache_dir: None,
            fallback_to_hash: default_true(),
            timeout_ms: default_timeout_ms(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
        }
    }
}

impl EmbeddingConfig {
    /// Per-call embedding deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolved model cache directory.
    ///
    /// Configured path, else `FASTEMBED_CACHE_DIR`, else fastembed's
    /// default relative directory.
    pub fn model_cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => expand_path(dir),
            None => Ok(std::env::var("FASTEMBED_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(FASTEMBED_DEFAULT_CACHE))),
        }
    }
}

// ============================================================================
// Selectors
// ============================================================================

/// A parsed backend selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSelector {
    Hash(usize),
    Model(String),
    Auto,
}

impl BackendSelector {
    /// Parse a selector string, taking defaults from `config`.
    pub fn parse(selector: &str, config: &EmbeddingConfig) -> Result<Self> {
        let selector = selector.trim();
        match selector.split_once(':') {
            None => match selector {
                "hash" => Ok(Self::Hash(config.hash_dimension)),
                "model" => Ok(Self::Model(config.model.clone())),
                "auto" | "" => Ok(Self::Auto),
                other => Err(Error::config(format!(
                    "Unknown embedding backend '{other}'. Expected auto, hash, hash:<dim> or model:<name>"
                ))),
            },
            Some(("hash", dim)) => {
                let dim: usize = dim.parse().map_err(|_| {
                    Error::config(format!("Invalid hash dimension '{dim}' in '{selector}'"))
                })?;
                Ok(Self::Hash(dim))
            }
            Some(("model", name)) if !name.is_empty() => Ok(Self::Model(name.to_string())),
            Some(_) => Err(Error::config(format!(
                "Invalid embedding backend '{selector}'"
            ))),
        }
    }
}

/// Hugging Face repository of each supported model.
fn model_repository(model_name: &str) -> Option<&'static str> {
    match model_name {
        "bge-small-en-v1.5" => Some("Xenova/bge-small-en-v1.5"),
        "all-minilm-l6-v2" => Some("Qdrant/all-MiniLM-L6-v2-onnx"),
        "bge-base-en-v1.5" => Some("Xenova/bge-base-en-v1.5"),
        "bge-large-en-v1.5" => Some("Xenova/bge-large-en-v1.5"),
        _ => None,
    }
}

/// Directory a cached model occupies under `cache_dir`.
pub fn cached_model_dir(cache_dir: &Path, model_name: &str) -> Result<PathBuf> {
    let repo = model_repository(model_name)
        .ok_or_else(|| Error::config(format!("Unknown embedding model: '{model_name}'")))?;
    Ok(cache_dir.join(format!("models--{}", repo.replace('/', "--"))))
}

// ============================================================================
// Selection
// ============================================================================

/// The outcome of backend selection.
#[derive(Clone, Default)]
pub struct BackendSelection {
    /// The active provider; `None` when embeddings are disabled.
    pub provider: Option<Arc<dyn EmbeddingProvider>>,
    /// Why the requested model was replaced by the hash backend.
    pub fallback: Option<String>,
}

impl BackendSelection {
    /// No provider: embeddings disabled.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// An explicitly chosen provider, no fallback.
    pub fn active(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider: Some(provider),
            fallback: None,
        }
    }

    /// Name of the active backend.
    pub fn name(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.name())
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

impl std::fmt::Debug for BackendSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSelection")
            .field("provider", &self.name())
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Resolve the embedding backend for this session.
pub fn select_provider(config: &EmbeddingConfig) -> Result<BackendSelection> {
    if !config.enabled {
        log::info!("Embeddings disabled; semantic search unavailable");
        return Ok(BackendSelection::disabled());
    }

    match BackendSelector::parse(&config.backend, config)? {
        BackendSelector::Hash(dimension) => {
            let provider = HashEmbeddingProvider::new(dimension)?;
            log::debug!("Using embedding backend {}", provider.name());
            Ok(BackendSelection::active(Arc::new(provider)))
        }
        BackendSelector::Model(name) => match load_model(&name, config) {
            Ok(provider) => Ok(BackendSelection::active(provider)),
            Err(err) if config.fallback_to_hash => fall_back(config, err),
            Err(err) => Err(match err {
                Error::BackendUnavailable(_) => err,
                other => Error::backend_unavailable(other.to_string()),
            }),
        },
        BackendSelector::Auto => match load_model(&config.model, config) {
            Ok(provider) => Ok(BackendSelection::active(provider)),
            Err(err) => fall_back(config, err),
        },
    }
}

fn fall_back(config: &EmbeddingConfig, reason: Error) -> Result<BackendSelection> {
    let provider = HashEmbeddingProvider::new(config.hash_dimension)?;
    log::warn!(
        "Embedding model unavailable ({reason}); falling back to {}",
        provider.name()
    );
    Ok(BackendSelection {
        provider: Some(Arc::new(provider)),
        fallback: Some(reason.to_string()),
    })
}

#[cfg(feature = "model-fastembed")]
fn load_model(name: &str, config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let cache_dir = config.model_cache_dir()?;
    let provider = crate::fastembed::FastEmbedProvider::new(name, &cache_dir)?;
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "model-fastembed"))]
fn load_model(name: &str, config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    cached_model_dir(&config.model_cache_dir()?, name)?;
    Err(Error::backend_unavailable(format!(
        "model '{name}' requested but this build has no model backend (enable the model-fastembed feature)"
    )))
}

// ============================================================================
// Tests
// ============================================================================
