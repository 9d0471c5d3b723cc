//! Embeddings and vector search for mailfind.
//!
//! This crate provides the embedding backends and the vector store. The
//! hash backend is always available; a local fastembed model is
//! feature-gated and only used when already cached.
//!
//! # Features
//!
//! - `model-fastembed`: Enable local embedding generation via fastembed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     mailfind-vector                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider trait                                    │
//! │  ├── HashEmbeddingProvider (always available)               │
//! │  └── FastEmbedProvider (feature: model-fastembed)           │
//! │  select_provider → BackendSelection (observable fallback)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  VectorIndex trait                                          │
//! │  └── VectorStore (redb, exact cosine scan)                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use mailfind_core::{MailStore, Message};
//! use mailfind_fts::{MessageStore, SearchConfig};
//! use mailfind_vector::{
//!     EmbeddingProvider, HashEmbeddingProvider, MessageVector, VectorIndex, VectorStore,
//! };
//!
//! # tokio_test::block_on(async {
//! let provider = HashEmbeddingProvider::new(64)?;
//! let mail = MailStore::in_memory()?;
//! let store = VectorStore::new(mail.clone());
//!
//! // Vectors hang off stored messages.
//! MessageStore::new(mail, SearchConfig::default())
//!     .upsert(&Message::new("m1", "Budget", "budget review"))?;
//! let vector = provider.embed("budget review").await?;
//! store.upsert(&MessageVector::new("m1", provider.name(), vector))?;
//!
//! let query = provider.embed("review of the budget").await?;
//! let hits = store.semantic_search(&query, provider.name(), 10)?;
//! assert_eq!(hits[0].message_id, "m1");
//! # Ok::<(), mailfind_core::Error>(())
//! # }).unwrap();
//! ```

// Core modules (always available)
pub mod embedding;
pub mod hash;
pub mod selection;
pub mod similarity;
pub mod store;
pub mod types;

// Feature-gated backend modules
#[cfg(feature = "model-fastembed")]
pub mod fastembed;

// Re-exports: core types
pub use types::{BackendCount, MessageVector, SemanticHit};

// Re-exports: providers
pub use embedding::{EmbeddingProvider, embed_with_deadline};
pub use hash::HashEmbeddingProvider;
pub use selection::{BackendSelection, BackendSelector, EmbeddingConfig, select_provider};

// Re-exports: store
pub use store::{VectorIndex, VectorStore};

// Feature-gated re-exports
#[cfg(feature = "model-fastembed")]
pub use fastembed::FastEmbedProvider;
