//! Batch ingestion of message records.
//!
//! The indexer normalizes incoming records, embeds them concurrently, and
//! commits each chunk in a single write transaction so a message, its
//! postings and its vector always become visible together.
//!
//! # Flow
//!
//! ```text
//! records ──► chunk (batch_size) ──► normalize ──► embed (concurrency, deadline)
//!                                        │                    │
//!                                   skip reason          skip reason
//!                                        ▼                    ▼
//!                               one write transaction: message + postings + vector
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use mailfind_core::{Error, MailStore, Message, RawMessage, Result};
use mailfind_fts::{MessageStore, SearchConfig};
use mailfind_vector::{
    BackendSelection, EmbeddingConfig, EmbeddingProvider, MessageVector, VectorStore,
    embed_with_deadline,
};
use serde::Serialize;

// ============================================================================
// Options and report
// ============================================================================

/// Per-call ingest options.
#[derive(Clone)]
pub struct IngestOptions {
    /// Store a vector for every committed message.
    pub generate_embeddings: bool,
    /// Use this provider instead of the indexer's active backend.
    pub backend_override: Option<Arc<dyn EmbeddingProvider>>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            generate_embeddings: true,
            backend_override: None,
        }
    }
}

impl IngestOptions {
    /// Index text only.
    pub fn without_embeddings() -> Self {
        Self {
            generate_embeddings: false,
            backend_override: None,
        }
    }
}

impl fmt::Debug for IngestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestOptions")
            .field("generate_embeddings", &self.generate_embeddings)
            .field(
                "backend_override",
                &self.backend_override.as_deref().map(|p| p.name()),
            )
            .finish()
    }
}

/// Why one record was not committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipReason {
    /// Zero-based position of the record in the input.
    pub position: usize,
    pub message_id: Option<String>,
    pub reason: String,
}

/// Outcome of one ingest call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Records committed, new or re-indexed.
    pub indexed: usize,
    /// Committed records that replaced an existing message id.
    pub updated: usize,
    /// Records not committed.
    pub skipped: usize,
    pub skip_reasons: Vec<SkipReason>,
    /// Embedding backend used; `None` when embeddings were off.
    pub backend: Option<String>,
}

impl IngestReport {
    fn skip(&mut self, position: usize, message_id: Option<String>, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!(
            "Skipping record {position} ({}): {reason}",
            message_id.as_deref().unwrap_or("no id")
        );
        self.skipped += 1;
        self.skip_reasons.push(SkipReason {
            position,
            message_id,
            reason,
        });
    }

    /// Records committed for the first time.
    pub fn inserted(&self) -> usize {
        self.indexed - self.updated
    }
}

// ============================================================================
// Indexer
// ============================================================================

/// Writes records into the message and vector stores.
#[derive(Clone)]
pub struct Indexer {
    messages: MessageStore,
    vectors: VectorStore,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    batch_size: usize,
    concurrency: usize,
    timeout: Duration,
}

impl Indexer {
    /// An indexer with no active embedding backend.
    ///
    /// Batch size, concurrency and the embedding deadline come from
    /// `embedding`.
    pub fn new(store: MailStore, search: SearchConfig, embedding: &EmbeddingConfig) -> Self {
        Self {
            messages: MessageStore::new(store.clone(), search),
            vectors: VectorStore::new(store),
            provider: None,
            batch_size: embedding.batch_size.max(1),
            concurrency: embedding.concurrency.max(1),
            timeout: embedding.timeout(),
        }
    }

    pub fn with_provider(mut self, provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        self.provider = provider;
        self
    }

    /// Use the backend chosen by [`select_provider`](mailfind_vector::select_provider).
    pub fn with_selection(self, selection: &BackendSelection) -> Self {
        self.with_provider(selection.provider.clone())
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    /// Ingest already-parsed records.
    pub async fn ingest<I>(&self, records: I, options: IngestOptions) -> Result<IngestReport>
    where
        I: IntoIterator<Item = RawMessage>,
    {
        self.ingest_records(records.into_iter().map(Ok), options)
            .await
    }

    /// Ingest records, some of which may have failed to parse upstream.
    ///
    /// A failed record is skipped with its error as the reason; the rest
    /// of the batch continues.
    pub async fn ingest_records<I>(&self, records: I, options: IngestOptions) -> Result<IngestReport>
    where
        I: IntoIterator<Item = Result<RawMessage>>,
    {
        let provider = if options.generate_embeddings {
            let provider = options
                .backend_override
                .or_else(|| self.provider.clone())
                .ok_or_else(|| {
                    Error::backend_unavailable(
                        "embedding generation requested but no embedding backend is active",
                    )
                })?;
            Some(provider)
        } else {
            None
        };

        let _writer = self.messages.mail_store().lock_writer().await;
        let start = Instant::now();

        let mut report = IngestReport {
            backend: provider.as_deref().map(|p| p.name().to_string()),
            ..IngestReport::default()
        };

        let mut chunk = Vec::with_capacity(self.batch_size);
        for (position, record) in records.into_iter().enumerate() {
            chunk.push((position, record));
            if chunk.len() >= self.batch_size {
                let batch = std::mem::replace(&mut chunk, Vec::with_capacity(self.batch_size));
                self.ingest_chunk(batch, provider.as_deref(), &mut report)
                    .await?;
            }
        }
        if !chunk.is_empty() {
            self.ingest_chunk(chunk, provider.as_deref(), &mut report)
                .await?;
        }

        log::info!(
            "Ingest complete: {} indexed ({} updated), {} skipped in {:?}",
            report.indexed,
            report.updated,
            report.skipped,
            start.elapsed()
        );
        Ok(report)
    }

    async fn ingest_chunk(
        &self,
        chunk: Vec<(usize, Result<RawMessage>)>,
        provider: Option<&dyn EmbeddingProvider>,
        report: &mut IngestReport,
    ) -> Result<()> {
        let mut valid: Vec<(usize, Message)> = Vec::with_capacity(chunk.len());
        for (position, record) in chunk {
            let raw = match record {
                Ok(raw) => raw,
                Err(err) => {
                    report.skip(position, None, err.to_string());
                    continue;
                }
            };
            let id_hint = raw
                .message_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            match raw.normalize() {
                Ok(message) => valid.push((position, message)),
                Err(err) => report.skip(position, id_hint, err.to_string()),
            }
        }
        if valid.is_empty() {
            return Ok(());
        }

        let embeddings: Vec<Option<Result<Vec<f32>>>> = match provider {
            Some(provider) => {
                let timeout = self.timeout;
                let texts: Vec<String> = valid
                    .iter()
                    .map(|(_, message)| message.embedding_text())
                    .collect();
                stream::iter(texts.into_iter().map(|text| {
                    async move { Some(embed_with_deadline(provider, &text, timeout).await) }
                }))
                .buffered(self.concurrency)
                .collect()
                .await
            }
            None => valid.iter().map(|_| None).collect(),
        };

        let txn = self.messages.mail_store().begin_write()?;
        let mut indexed = 0;
        let mut updated = 0;
        for ((position, message), embedding) in valid.into_iter().zip(embeddings) {
            let vector = match embedding {
                Some(Ok(vector)) => Some(vector),
                Some(Err(err)) => {
                    report.skip(
                        position,
                        Some(message.message_id),
                        format!("embedding failed: {err}"),
                    );
                    continue;
                }
                None => None,
            };

            let outcome = self.messages.upsert_in(&txn, &message)?;
            if let (Some(vector), Some(provider)) = (vector, provider) {
                let record = MessageVector::new(&message.message_id, provider.name(), vector);
                self.vectors.upsert_in(&txn, &record)?;
            }

            indexed += 1;
            if outcome.is_update() {
                updated += 1;
            }
        }
        txn.commit()?;

        report.indexed += indexed;
        report.updated += updated;
        log::debug!("Committed chunk: {indexed} indexed, {updated} updated");
        Ok(())
    }
}

impl fmt::Debug for Indexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indexer")
            .field("backend", &self.provider.as_deref().map(|p| p.name()))
            .field("batch_size", &self.batch_size)
            .field("concurrency", &self.concurrency)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
