//! mailfind core: shared records, errors, text analysis and the store handle.
//!
//! This crate provides the foundational types used across all mailfind
//! crates. It has no internal mailfind dependencies.
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`rank`]: Result ordering shared by every search path
//! - [`record`]: `Message` and the incoming `RawMessage` with normalization
//! - [`store`]: The embedded database shared by the message and vector stores
//! - [`text`]: The analyzer used for indexing, querying and hash embeddings
//! - [`util`]: Path helpers

pub mod error;
pub mod rank;
pub mod record;
pub mod store;
pub mod text;
pub mod util;

// Re-export key types at crate root for convenience
pub use error::{Error, Result};
pub use rank::Ranked;
pub use record::{Message, RawMessage};
pub use store::MailStore;
pub use text::{AnalyzedToken, Analyzer};
