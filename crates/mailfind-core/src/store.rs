//! The embedded database shared by the message store and the vector store.
//!
//! One redb file holds every table, so a message, its full-text postings
//! and its vectors can be committed in a single write transaction. redb
//! gives us the concurrency model directly: write transactions are
//! serialized, read transactions are MVCC snapshots that never block and
//! never observe uncommitted state.
//!
//! Across processes, redb's file lock allows one writable handle *or*
//! any number of read-only handles. Query-side callers use
//! [`MailStore::open_read_only`]; while an ingest holds the file they get
//! a retryable `StoreBusy` instead of a half-written view.
//!
//! # Layout
//!
//! | Table | Key | Value |
//! |-------|-----|-------|
//! | `messages` | message_id | JSON [`Message`](crate::Message) |
//! | `postings` | (term, message_id) | (subject tf, body tf) |
//! | `doc_terms` | message_id | JSON term list + length |
//! | `corpus_stats` | stat name | u64 |
//! | `vectors` | (message_id, backend_name) | (dimension, LE f32 bytes) |
//! | `meta` | key | value |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{
    Database, ReadOnlyDatabase, ReadTransaction, ReadableDatabase, ReadableTable,
    WriteTransaction,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{Error, Result};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: &str = "1";

/// Table definitions, shared by the crates that read and write them.
pub mod tables {
    use redb::TableDefinition;

    /// message_id → JSON-encoded message record.
    pub const MESSAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");

    /// (term, message_id) → (term frequency in subject, in body).
    pub const POSTINGS: TableDefinition<(&str, &str), (u32, u32)> =
        TableDefinition::new("postings");

    /// message_id → JSON-encoded distinct terms and token length.
    pub const DOC_TERMS: TableDefinition<&str, &[u8]> = TableDefinition::new("doc_terms");

    /// Corpus-wide counters used for BM25 normalization.
    pub const CORPUS_STATS: TableDefinition<&str, u64> = TableDefinition::new("corpus_stats");

    /// (message_id, backend_name) → (dimension, little-endian f32 payload).
    pub const VECTORS: TableDefinition<(&str, &str), (u32, &[u8])> =
        TableDefinition::new("vectors");

    /// Store metadata (schema version).
    pub const META: TableDefinition<&str, &str> = TableDefinition::new("meta");
}

/// Handle to an initialized mail store.
///
/// Cheap to clone; every clone shares the same database and writer lock.
/// Pass it explicitly to the components that need it.
#[derive(Clone)]
pub struct MailStore {
    db: Arc<Handle>,
    path: Option<PathBuf>,
    writer: Arc<Mutex<()>>,
}

enum Handle {
    Writable(Database),
    ReadOnly(ReadOnlyDatabase),
}

impl MailStore {
    /// Open the store at `path`, creating and initializing it if needed.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(e, parent))?;
        }
        let db = Database::create(path)?;
        log::debug!("Opened mail store at {}", path.display());
        Self::initialize(db, Some(path.to_path_buf()))
    }

    /// Open an existing store for writing; fails with `StoreUnavailable`
    /// if absent.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_exists(path)?;
        let db = Database::open(path).map_err(|e| busy_or(e, path))?;
        Self::initialize(db, Some(path.to_path_buf()))
    }

    /// Open an existing store for reading only.
    ///
    /// Several read-only handles, in this or other processes, may be open
    /// at once. Fails with `StoreBusy` while a writable handle is open and
    /// with `StoreUnavailable` if the file is absent or uninitialized.
    /// Writes through the returned handle fail.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_exists(path)?;
        let db = ReadOnlyDatabase::open(path).map_err(|e| busy_or(e, path))?;
        check_schema(&db.begin_read()?)?;
        log::debug!("Opened mail store at {} (read-only)", path.display());
        Ok(Self {
            db: Arc::new(Handle::ReadOnly(db)),
            path: Some(path.to_path_buf()),
            writer: Arc::new(Mutex::new(())),
        })
    }

    /// Create a throwaway store backed by memory.
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::initialize(db, None)
    }

    /// Create all tables and check the schema version.
    fn initialize(db: Database, path: Option<PathBuf>) -> Result<Self> {
        let txn = db.begin_write()?;
        {
            let mut meta = txn.open_table(tables::META)?;
            let existing = meta.get("schema_version")?.map(|v| v.value().to_string());
            match existing {
                Some(version) => supported_version(&version)?,
                None => {
                    meta.insert("schema_version", SCHEMA_VERSION)?;
                }
            }
            txn.open_table(tables::MESSAGES)?;
            txn.open_table(tables::POSTINGS)?;
            txn.open_table(tables::DOC_TERMS)?;
            txn.open_table(tables::CORPUS_STATS)?;
            txn.open_table(tables::VECTORS)?;
        }
        txn.commit()?;

        Ok(Self {
            db: Arc::new(Handle::Writable(db)),
            path,
            writer: Arc::new(Mutex::new(())),
        })
    }

    /// Begin a snapshot read.
    pub fn begin_read(&self) -> Result<ReadTransaction> {
        let txn = match self.db.as_ref() {
            Handle::Writable(db) => db.begin_read()?,
            Handle::ReadOnly(db) => db.begin_read()?,
        };
        Ok(txn)
    }

    /// Begin a write transaction. Blocks while another write is open.
    pub fn begin_write(&self) -> Result<WriteTransaction> {
        match self.db.as_ref() {
            Handle::Writable(db) => Ok(db.begin_write()?),
            Handle::ReadOnly(_) => Err(Error::store_unavailable(
                "store was opened read-only; writes are not allowed",
            )),
        }
    }

    /// Whether this handle was opened with [`open_read_only`](Self::open_read_only).
    pub fn is_read_only(&self) -> bool {
        matches!(self.db.as_ref(), Handle::ReadOnly(_))
    }

    /// Acquire the batch-level writer lock.
    ///
    /// Held by the indexer for a whole ingest so two batches never
    /// interleave against the same database.
    pub async fn lock_writer(&self) -> OwnedMutexGuard<()> {
        self.writer.clone().lock_owned().await
    }

    /// Whether an ingest currently holds the writer lock.
    pub fn is_writing(&self) -> bool {
        self.writer.try_lock().is_err()
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    Err(Error::store_unavailable(format!(
        "no store at {} (index some messages first)",
        path.display()
    )))
}

fn busy_or(err: redb::DatabaseError, path: &Path) -> Error {
    match err {
        redb::DatabaseError::DatabaseAlreadyOpen => Error::store_busy(format!(
            "ingest in progress on {}; retry when it finishes",
            path.display()
        )),
        other => other.into(),
    }
}

fn supported_version(version: &str) -> Result<()> {
    if version == SCHEMA_VERSION {
        return Ok(());
    }
    Err(Error::store_unavailable(format!(
        "store schema version {version} is not supported (expected {SCHEMA_VERSION})"
    )))
}

/// Verify the schema without writing; a store never initialized by a
/// writer is unavailable.
fn check_schema(txn: &ReadTransaction) -> Result<()> {
    let meta = txn.open_table(tables::META)?;
    match meta.get("schema_version")? {
        Some(version) => supported_version(version.value()),
        None => Err(Error::store_unavailable("store has no schema version")),
    }
}

/// Remove every stored vector of `message_id`, across all backends.
///
/// Used by both stores so a deleted message never leaves vectors behind.
pub fn remove_vectors_in(txn: &WriteTransaction, message_id: &str) -> Result<usize> {
    let mut table = txn.open_table(tables::VECTORS)?;
    let mut backends = Vec::new();
    for entry in table.range((message_id, "")..)? {
        let (key, _) = entry?;
        let (id, backend) = key.value();
        if id != message_id {
            break;
        }
        backends.push(backend.to_string());
    }
    for backend in &backends {
        table.remove((message_id, backend.as_str()))?;
    }
    Ok(backends.len())
}

impl std::fmt::Debug for MailStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailStore")
            .field("path", &self.path)
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_initializes_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = MailStore::create(dir.path().join("mail.redb")).unwrap();
        let txn = store.begin_read().unwrap();
        let meta = txn.open_table(tables::META).unwrap();
        assert_eq!(
            meta.get("schema_version").unwrap().unwrap().value(),
            SCHEMA_VERSION
        );
        assert!(txn.open_table(tables::MESSAGES).is_ok());
        assert!(txn.open_table(tables::VECTORS).is_ok());
    }

    #[test]
    fn test_create_makes_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/mail.redb");
        let store = MailStore::create(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert!(path.exists());
    }

    #[test]
    fn test_open_missing_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = MailStore::open(dir.path().join("absent.redb")).unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[test]
    fn test_reopen_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.redb");
        drop(MailStore::create(&path).unwrap());
        assert!(MailStore::open(&path).is_ok());
    }

    #[test]
    fn test_read_only_while_writer_open_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.redb");
        let writer = MailStore::create(&path).unwrap();

        let err = MailStore::open_read_only(&path).unwrap_err();
        assert!(matches!(err, Error::StoreBusy(_)));
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("ingest in progress"));

        drop(writer);
        assert!(MailStore::open_read_only(&path).is_ok());
    }

    #[test]
    fn test_read_only_handles_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.redb");
        {
            let store = MailStore::create(&path).unwrap();
            let txn = store.begin_write().unwrap();
            {
                let mut messages = txn.open_table(tables::MESSAGES).unwrap();
                messages.insert("m1", &b"{}"[..]).unwrap();
            }
            txn.commit().unwrap();
        }

        let first = MailStore::open_read_only(&path).unwrap();
        let second = MailStore::open_read_only(&path).unwrap();
        assert!(first.is_read_only());

        for store in [&first, &second] {
            let txn = store.begin_read().unwrap();
            let messages = txn.open_table(tables::MESSAGES).unwrap();
            assert!(messages.get("m1").unwrap().is_some());
        }

        let err = first.begin_write().err().expect("begin_write should fail");
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[test]
    fn test_read_only_needs_initialized_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.redb");
        drop(Database::create(&path).unwrap());

        let err = MailStore::open_read_only(&path).unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));

        let err = MailStore::open_read_only(dir.path().join("absent.redb")).unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[test]
    fn test_in_memory() {
        let store = MailStore::in_memory().unwrap();
        assert!(store.path().is_none());
        assert!(!store.is_read_only());
        assert!(store.begin_read().is_ok());
    }

    #[tokio::test]
    async fn test_writer_lock_is_exclusive() {
        let store = MailStore::in_memory().unwrap();
        assert!(!store.is_writing());
        let guard = store.lock_writer().await;
        assert!(store.clone().is_writing());
        drop(guard);
        assert!(!store.is_writing());
    }

    #[test]
    fn test_remove_vectors_only_touches_one_message() {
        let store = MailStore::in_memory().unwrap();
        let txn = store.begin_write().unwrap();
        {
            let mut vectors = txn.open_table(tables::VECTORS).unwrap();
            let payload = [0u8; 8];
            vectors.insert(("m1", "hash:2"), (2u32, &payload[..])).unwrap();
            vectors.insert(("m1", "hash:4"), (2u32, &payload[..])).unwrap();
            vectors.insert(("m10", "hash:2"), (2u32, &payload[..])).unwrap();
        }
        assert_eq!(remove_vectors_in(&txn, "m1").unwrap(), 2);
        assert_eq!(remove_vectors_in(&txn, "absent").unwrap(), 0);
        txn.commit().unwrap();

        let read = store.begin_read().unwrap();
        let vectors = read.open_table(tables::VECTORS).unwrap();
        assert_eq!(vectors.iter().unwrap().count(), 1);
        assert!(vectors.get(("m10", "hash:2")).unwrap().is_some());
    }

    #[test]
    fn test_debug_format() {
        let store = MailStore::in_memory().unwrap();
        assert!(format!("{store:?}").contains("MailStore"));
    }
}
