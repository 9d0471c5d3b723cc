//! Full-text search for mailfind.
//!
//! This crate owns the message records and their lexical index, both kept
//! in the shared redb store from `mailfind-core`.
//!
//! # Modules
//!
//! - [`message_store`]: `MessageStore` with upsert, get, delete and search
//! - [`query`]: The query language (terms, phrases, `+`/`-`, AND/OR/NOT)
//! - [`bm25`]: BM25 scoring with subject boosting
//! - [`snippet`]: Highlighted excerpts and previews
//! - [`types`]: Configuration and result types

pub mod bm25;
pub mod message_store;
pub mod query;
pub mod snippet;
pub mod types;

pub use message_store::MessageStore;
pub use query::{Clause, Occur, ParsedQuery};
pub use snippet::{Snippet, SnippetKind};
pub use types::{LexicalHit, QueryMode, SearchConfig, UpsertOutcome};
