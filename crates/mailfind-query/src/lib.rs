//! Indexing and querying for mailfind.
//!
//! This crate ties the message store and the vector store together:
//!
//! - [`Indexer`]: batch ingestion, one write transaction per chunk
//! - [`QueryEngine`]: lexical, semantic and hybrid search
//! - [`hybrid`]: score fusion (min-max weighted sum or reciprocal rank)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mailfind_core::{MailStore, RawMessage};
//! use mailfind_fts::SearchConfig;
//! use mailfind_query::{IngestOptions, Indexer, QueryEngine, SearchMode};
//! use mailfind_vector::{EmbeddingConfig, select_provider};
//!
//! # async fn run() -> mailfind_core::Result<()> {
//! let store = MailStore::create("mailfind.redb")?;
//! let embedding = EmbeddingConfig::default();
//! let selection = select_provider(&embedding)?;
//!
//! let indexer = Indexer::new(store.clone(), SearchConfig::default(), &embedding)
//!     .with_selection(&selection);
//! let records = vec![RawMessage::new("m1", "Invoice for March", "Invoice attached.")];
//! indexer.ingest(records, IngestOptions::default()).await?;
//!
//! let engine = QueryEngine::new(store, SearchConfig::default()).with_selection(&selection);
//! for result in engine.search("march invoice", SearchMode::Hybrid, 10).await? {
//!     println!("{} {:.3} {}", result.message_id, result.fused_score, result.snippet);
//! }
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod hybrid;
pub mod indexer;

pub use engine::{QueryEngine, QueryResult, SearchMode};
pub use hybrid::{FusedHit, FusionStrategy, HitSource, HybridConfig};
pub use indexer::{IngestOptions, IngestReport, Indexer, SkipReason};
