//! The vector store: per-message embeddings with brute-force search.
//!
//! Vectors live in the `vectors` table of the shared [`MailStore`],
//! keyed by (message_id, backend_name), so a message may carry vectors
//! from several backends while search only ever compares vectors from
//! one. Payloads are little-endian `f32` bytes.
//!
//! Search is an exact linear scan. Callers depend only on
//! [`VectorIndex`], so an approximate index can replace it later.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use mailfind_core::store::{remove_vectors_in, tables};
use mailfind_core::{Error, MailStore, Result, rank};
use redb::{ReadTransaction, ReadableTable, WriteTransaction};
use serde::Deserialize;

use crate::similarity::cosine_similarity;
use crate::types::{BackendCount, MessageVector, SemanticHit};

/// Ranked nearest-neighbour lookup over stored vectors.
pub trait VectorIndex: Send + Sync {
    /// The `limit` stored vectors of `backend` most similar to `query`.
    fn semantic_search(&self, query: &[f32], backend: &str, limit: usize)
    -> Result<Vec<SemanticHit>>;
}

/// Vector persistence over the shared store.
#[derive(Clone, Debug)]
pub struct VectorStore {
    store: MailStore,
}

impl VectorStore {
    pub fn new(store: MailStore) -> Self {
        Self { store }
    }

    /// Insert or replace one vector in its own transaction.
    pub fn upsert(&self, vector: &MessageVector) -> Result<()> {
        let txn = self.store.begin_write()?;
        self.upsert_in(&txn, vector)?;
        txn.commit()?;
        Ok(())
    }

    /// Insert or replace inside a caller-owned transaction.
    ///
    /// The message must already be stored (or written earlier in `txn`);
    /// otherwise `NotFound`.
    pub fn upsert_in(&self, txn: &WriteTransaction, vector: &MessageVector) -> Result<()> {
        vector.validate()?;
        let messages = txn.open_table(tables::MESSAGES)?;
        if messages.get(vector.message_id.as_str())?.is_none() {
            return Err(Error::not_found("Message", &vector.message_id));
        }
        drop(messages);

        let payload = encode(&vector.vector);
        let mut table = txn.open_table(tables::VECTORS)?;
        table.insert(
            (vector.message_id.as_str(), vector.backend.as_str()),
            (vector.dimension as u32, payload.as_slice()),
        )?;
        Ok(())
    }

    /// Remove every backend's vector for a message; returns how many.
    pub fn delete(&self, message_id: &str) -> Result<usize> {
        let txn = self.store.begin_write()?;
        let removed = self.delete_in(&txn, message_id)?;
        txn.commit()?;
        Ok(removed)
    }

    pub fn delete_in(&self, txn: &WriteTransaction, message_id: &str) -> Result<usize> {
        remove_vectors_in(txn, message_id)
    }

    /// The stored vector of one message under one backend.
    pub fn get(&self, message_id: &str, backend: &str) -> Result<Option<MessageVector>> {
        let txn = self.store.begin_read()?;
        let table = txn.open_table(tables::VECTORS)?;
        let Some(entry) = table.get((message_id, backend))? else {
            return Ok(None);
        };
        let (dimension, payload) = entry.value();
        Ok(Some(MessageVector {
            message_id: message_id.to_string(),
            backend: backend.to_string(),
            dimension: dimension as usize,
            vector: decode(payload, dimension)?,
        }))
    }

    /// Distinct backends with their vector counts.
    pub fn backends(&self) -> Result<Vec<BackendCount>> {
        let txn = self.store.begin_read()?;
        let table = txn.open_table(tables::VECTORS)?;
        let mut counts: BTreeMap<String, BackendCount> = BTreeMap::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let (_, backend) = key.value();
            let (dimension, _) = value.value();
            counts
                .entry(backend.to_string())
                .or_insert_with(|| BackendCount {
                    backend: backend.to_string(),
                    count: 0,
                    dimension: dimension as usize,
                })
                .count += 1;
        }
        Ok(counts.into_values().collect())
    }
}

impl VectorIndex for VectorStore {
    fn semantic_search(
        &self,
        query: &[f32],
        backend: &str,
        limit: usize,
    ) -> Result<Vec<SemanticHit>> {
        self.semantic_search_in(&self.store.begin_read()?, query, backend, limit)
    }
}

impl VectorStore {
    /// [`semantic_search`](VectorIndex::semantic_search) against a
    /// caller-owned snapshot.
    pub fn semantic_search_in(
        &self,
        txn: &ReadTransaction,
        query: &[f32],
        backend: &str,
        limit: usize,
    ) -> Result<Vec<SemanticHit>> {
        if query.is_empty() {
            return Err(Error::invalid_data("query vector is empty"));
        }

        let table = txn.open_table(tables::VECTORS)?;

        let mut scored: Vec<(String, f32)> = Vec::new();
        let mut other_backends: BTreeSet<String> = BTreeSet::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let (message_id, stored_backend) = key.value();
            if stored_backend != backend {
                other_backends.insert(stored_backend.to_string());
                continue;
            }
            let (dimension, payload) = value.value();
            if dimension as usize != query.len() {
                return Err(Error::backend_mismatch(
                    format!("{backend} vectors of dimension {}", query.len()),
                    format!("dimension {dimension} for message {message_id}"),
                ));
            }
            let stored = decode(payload, dimension)?;
            scored.push((message_id.to_string(), cosine_similarity(query, &stored)));
        }

        if scored.is_empty() {
            if !other_backends.is_empty() {
                let found = other_backends.into_iter().collect::<Vec<_>>().join(", ");
                return Err(Error::backend_mismatch(backend, found));
            }
            return Ok(Vec::new());
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        // Only entries tied with the cut-off need their dates for ordering.
        scored.sort_by(|a, b| rank::compare_scores(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
        let cutoff = scored[limit.min(scored.len()) - 1].1;
        let mut hits = Vec::new();
        let at_or_above_cutoff = |(_, s): &(String, f32)| rank::compare_scores(*s, cutoff).is_le();
        for (message_id, score) in scored.into_iter().take_while(at_or_above_cutoff) {
            let date = message_date(txn, &message_id)?;
            hits.push(SemanticHit {
                message_id,
                score,
                date,
            });
        }
        rank::sort_and_truncate(&mut hits, limit);

        log::debug!("Semantic search over {backend} returned {} hits", hits.len());
        Ok(hits)
    }
}

#[derive(Deserialize)]
struct DatedRecord {
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

fn message_date(txn: &ReadTransaction, message_id: &str) -> Result<Option<DateTime<Utc>>> {
    let messages = txn.open_table(tables::MESSAGES)?;
    match messages.get(message_id)? {
        Some(record) => Ok(serde_json::from_slice::<DatedRecord>(record.value())?.date),
        None => Ok(None),
    }
}

fn encode(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode(payload: &[u8], dimension: u32) -> Result<Vec<f32>> {
    if payload.len() != dimension as usize * 4 {
        return Err(Error::invalid_data(format!(
            "stored vector has {} bytes, expected {}",
            payload.len(),
            dimension as usize * 4
        )));
    }
    Ok(payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
