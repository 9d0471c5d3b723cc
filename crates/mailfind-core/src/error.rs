//! Error types for mailfind operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all mailfind crates. Uses `thiserror` for derive macros.
//!
//! Variants map onto the failure kinds callers act on: store availability,
//! query syntax, embedding backend resolution and compatibility, deadlines,
//! and malformed ingest records.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in mailfind operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error with the path that caused it.
    #[error("I/O error at {path}: {source}")]
    IoWithPath {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid data or format.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic operation failure.
    #[error("Operation failed: {0}")]
    Operation(String),

    /// The underlying store reported a failure.
    #[error("Store error: {0}")]
    Store(String),

    /// The store is not reachable or has not been initialized.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Another process holds the store for writing; retry later.
    #[error("Store busy: {0}")]
    StoreBusy(String),

    /// The query text could not be parsed.
    #[error("Query syntax error at '{token}': {reason}")]
    QuerySyntax {
        /// The offending token as written by the caller.
        token: String,
        /// What is wrong with it.
        reason: String,
    },

    /// No embedding backend could be resolved.
    #[error("Embedding backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Vectors from different backends or dimensions were compared.
    #[error("Backend mismatch: expected {expected}, found {found}")]
    BackendMismatch {
        /// What the caller asked for.
        expected: String,
        /// What the store holds.
        found: String,
    },

    /// A bounded-time operation exceeded its deadline.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// The operation that was cut off.
        operation: String,
        /// The deadline that expired.
        timeout: Duration,
    },

    /// A single ingest record is invalid.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not found error for a kind of item and its identifier.
    pub fn not_found(kind: &str, id: impl AsRef<str>) -> Self {
        Self::NotFound(format!("{kind} '{}'", id.as_ref()))
    }

    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create a generic operation error.
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Create a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a store-unavailable error.
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a store-busy error.
    pub fn store_busy(msg: impl Into<String>) -> Self {
        Self::StoreBusy(msg.into())
    }

    /// Create a query syntax error naming the offending token.
    pub fn query_syntax(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QuerySyntax {
            token: token.into(),
            reason: reason.into(),
        }
    }

    /// Create a backend-unavailable error.
    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Create a backend mismatch error.
    pub fn backend_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::BackendMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create a malformed record error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRecord(msg.into())
    }

    /// Attach a path to an I/O error.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::IoWithPath {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Whether this error reports a missing record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the caller can recover by retrying, rephrasing, or
    /// downgrading the search mode.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::StoreBusy(_)
                | Self::QuerySyntax { .. }
                | Self::BackendUnavailable(_)
                | Self::Timeout { .. }
                | Self::MalformedRecord(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(err: redb::DatabaseError) -> Self {
        match err {
            redb::DatabaseError::DatabaseAlreadyOpen => Self::StoreBusy(err.to_string()),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<redb::TableError> for Error {
    fn from(err: redb::TableError) -> Self {
        match err {
            redb::TableError::TableDoesNotExist(name) => {
                Self::StoreUnavailable(format!("table '{name}' has not been initialized"))
            }
            other => Self::Store(other.to_string()),
        }
    }
}

impl From<redb::TransactionError> for Error {
    fn from(err: redb::TransactionError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<redb::StorageError> for Error {
    fn from(err: redb::StorageError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<redb::CommitError> for Error {
    fn from(err: redb::CommitError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<redb::Error> for Error {
    fn from(err: redb::Error) -> Self {
        Self::Store(err.to_string())
    }
}

/// Result type alias using mailfind's Error type.
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Tests
// ============================================================================
