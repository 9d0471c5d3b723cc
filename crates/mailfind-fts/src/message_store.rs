//! The message store: records, postings and BM25 search over redb.
//!
//! This module provides `MessageStore`, the lexical half of mailfind. It
//! keeps, in the shared [`MailStore`] database:
//! - the normalized message record, for `get`/`show`
//! - an inverted index of analyzed terms with per-field frequencies
//! - per-document term lists and lengths, so a replace can drop its
//!   old postings
//! - corpus counters for BM25 length normalization
//!
//! # Usage
//!
//! ```
//! use mailfind_core::{MailStore, Message};
//! use mailfind_fts::{MessageStore, SearchConfig};
//!
//! let store = MessageStore::new(MailStore::in_memory()?, SearchConfig::default());
//! store.upsert(&Message::new("m1", "Invoice for March", "Please find the invoice attached."))?;
//!
//! let hits = store.lexical_search("invoice", 10)?;
//! assert_eq!(hits[0].message_id, "m1");
//! # Ok::<(), mailfind_core::Error>(())
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use mailfind_core::store::{remove_vectors_in, tables};
use mailfind_core::{AnalyzedToken, Analyzer, Error, MailStore, Message, Ranked, Result, rank};
use redb::{ReadTransaction, ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};

use crate::bm25::{self, Bm25Params, CorpusStats};
use crate::query::{Clause, Occur, ParsedQuery};
use crate::snippet::Snippet;
use crate::types::{LexicalHit, SearchConfig, UpsertOutcome};

const DOC_COUNT: &str = "doc_count";
const TOTAL_LENGTH: &str = "total_length";

/// Per-document index bookkeeping stored in `doc_terms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocStats {
    terms: Vec<String>,
    length: u32,
    date: Option<DateTime<Utc>>,
}

/// message_id → (subject tf, body tf) for one term.
type TermPostings = HashMap<String, (u32, u32)>;

/// Message records with full-text search.
#[derive(Clone)]
pub struct MessageStore {
    store: MailStore,
    analyzer: Analyzer,
    config: SearchConfig,
}

impl MessageStore {
    pub fn new(store: MailStore, config: SearchConfig) -> Self {
        Self {
            store,
            analyzer: Analyzer::english(),
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn mail_store(&self) -> &MailStore {
        &self.store
    }

    fn bm25_params(&self) -> Bm25Params {
        Bm25Params {
            k1: self.config.bm25_k1,
            b: self.config.bm25_b,
            subject_boost: self.config.subject_boost,
        }
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Insert or replace a message in its own transaction.
    pub fn upsert(&self, message: &Message) -> Result<UpsertOutcome> {
        let txn = self.store.begin_write()?;
        let outcome = self.upsert_in(&txn, message)?;
        txn.commit()?;
        Ok(outcome)
    }

    /// Insert or replace a message inside a caller-owned transaction.
    ///
    /// A replaced message loses its old postings and any stored vectors;
    /// the caller writes fresh vectors in the same transaction.
    pub fn upsert_in(&self, txn: &WriteTransaction, message: &Message) -> Result<UpsertOutcome> {
        let id = message.message_id.as_str();
        let replaced = self.remove_index_entries(txn, id)?;
        if replaced {
            remove_vectors_in(txn, id)?;
        }

        let subject_terms = self.analyzer.terms(&message.subject);
        let body_terms = self.analyzer.terms(&message.body);
        let length = (subject_terms.len() + body_terms.len()) as u32;

        let mut freqs: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
        for term in &subject_terms {
            freqs.entry(term.as_str()).or_default().0 += 1;
        }
        for term in &body_terms {
            freqs.entry(term.as_str()).or_default().1 += 1;
        }

        {
            let mut messages = txn.open_table(tables::MESSAGES)?;
            let record = serde_json::to_vec(message)?;
            messages.insert(id, record.as_slice())?;
        }
        {
            let mut postings = txn.open_table(tables::POSTINGS)?;
            for (term, tf) in &freqs {
                postings.insert((*term, id), *tf)?;
            }
        }
        {
            let stats = DocStats {
                terms: freqs.keys().map(|t| t.to_string()).collect(),
                length,
                date: message.date,
            };
            let mut doc_terms = txn.open_table(tables::DOC_TERMS)?;
            let encoded = serde_json::to_vec(&stats)?;
            doc_terms.insert(id, encoded.as_slice())?;
        }
        adjust_stats(txn, 1, i64::from(length))?;

        log::debug!(
            "Indexed message {id}: {} distinct terms, length {length}",
            freqs.len()
        );

        Ok(if replaced {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    /// Delete a message, its postings and all its vectors.
    pub fn delete(&self, message_id: &str) -> Result<()> {
        let txn = self.store.begin_write()?;
        if !self.delete_in(&txn, message_id)? {
            return Err(Error::not_found("Message", message_id));
        }
        txn.commit()?;
        Ok(())
    }

    /// Delete inside a caller-owned transaction; returns whether it existed.
    pub fn delete_in(&self, txn: &WriteTransaction, message_id: &str) -> Result<bool> {
        self.remove_index_entries(txn, message_id)?;
        let existed = {
            let mut messages = txn.open_table(tables::MESSAGES)?;
            messages.remove(message_id)?.is_some()
        };
        let vectors = remove_vectors_in(txn, message_id)?;
        if existed {
            log::debug!("Deleted message {message_id} and {vectors} vectors");
        }
        Ok(existed)
    }

    /// Drop postings, doc stats and corpus counters for one message.
    fn remove_index_entries(&self, txn: &WriteTransaction, message_id: &str) -> Result<bool> {
        let previous: Option<DocStats> = {
            let mut doc_terms = txn.open_table(tables::DOC_TERMS)?;
            let removed = doc_terms.remove(message_id)?;
            match removed {
                Some(guard) => Some(serde_json::from_slice(guard.value())?),
                None => None,
            }
        };
        let Some(previous) = previous else {
            return Ok(false);
        };

        {
            let mut postings = txn.open_table(tables::POSTINGS)?;
            for term in &previous.terms {
                postings.remove((term.as_str(), message_id))?;
            }
        }
        adjust_stats(txn, -1, -i64::from(previous.length))?;
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Fetch the complete normalized message.
    pub fn get(&self, message_id: &str) -> Result<Message> {
        self.get_in(&self.store.begin_read()?, message_id)
    }

    /// [`get`](Self::get) against a caller-owned snapshot.
    pub fn get_in(&self, txn: &ReadTransaction, message_id: &str) -> Result<Message> {
        load_message(txn, message_id)?.ok_or_else(|| Error::not_found("Message", message_id))
    }

    /// Number of stored messages.
    pub fn count(&self) -> Result<u64> {
        let txn = self.store.begin_read()?;
        Ok(read_stats(&txn)?.doc_count)
    }

    /// Snippet of `message` for a query, whatever produced the match.
    ///
    /// Query syntax errors are tolerated here; the raw query terms are
    /// highlighted instead.
    pub fn snippet_for(&self, message: &Message, query: &str) -> Snippet {
        let terms = match ParsedQuery::parse(query, &self.analyzer, self.config.query_mode) {
            Ok(parsed) => parsed.highlight_terms(),
            Err(_) => self.analyzer.terms(query).into_iter().collect(),
        };
        Snippet::extract(
            &self.analyzer,
            &message.body,
            &terms,
            self.config.snippet_tokens,
            self.config.preview_chars,
        )
    }

    /// BM25 search over subject and body.
    pub fn lexical_search(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        self.lexical_search_in(&self.store.begin_read()?, query, limit)
    }

    /// [`lexical_search`](Self::lexical_search) against a caller-owned
    /// snapshot, so it can be combined with other reads of the same state.
    pub fn lexical_search_in(
        &self,
        txn: &ReadTransaction,
        query: &str,
        limit: usize,
    ) -> Result<Vec<LexicalHit>> {
        let parsed = ParsedQuery::parse(query, &self.analyzer, self.config.query_mode)?;
        if parsed.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let stats = read_stats(txn)?;
        if stats.doc_count == 0 {
            return Ok(Vec::new());
        }

        let mut postings: HashMap<&str, TermPostings> = HashMap::new();
        {
            let table = txn.open_table(tables::POSTINGS)?;
            for term in parsed.all_terms() {
                postings.insert(term, load_postings(&table, term)?);
            }
        }

        let mut candidates: BTreeSet<&str> = BTreeSet::new();
        for clause in parsed.clauses().iter().filter(|c| c.occur != Occur::MustNot) {
            for term in &clause.terms {
                if let Some(docs) = postings.get(term.as_str()) {
                    candidates.extend(docs.keys().map(String::as_str));
                }
            }
        }

        let doc_terms = txn.open_table(tables::DOC_TERMS)?;
        let params = self.bm25_params();
        let avgdl = stats.average_doc_length();
        let scoring_terms = parsed.scoring_terms();

        let mut scored = Vec::new();
        for id in candidates {
            let mut matcher = ClauseMatcher {
                txn,
                analyzer: &self.analyzer,
                postings: &postings,
                id,
                fields: None,
            };
            if !matcher.accepts(&parsed)? {
                continue;
            }

            let Some(doc) = load_doc_stats(&doc_terms, id)? else {
                log::warn!("Message {id} has postings but no document stats");
                continue;
            };
            let score: f32 = scoring_terms
                .iter()
                .filter_map(|term| {
                    let docs = postings.get(term)?;
                    let &(subject_tf, body_tf) = docs.get(id)?;
                    let idf = bm25::idf(stats.doc_count, docs.len() as u64);
                    let tf = bm25::weighted_tf(subject_tf, body_tf, &params);
                    Some(bm25::term_score(idf, tf, doc.length, avgdl, &params))
                })
                .sum();

            scored.push(Scored {
                id: id.to_string(),
                score,
                date: doc.date,
            });
        }

        rank::sort_and_truncate(&mut scored, limit);

        let highlight = parsed.highlight_terms();
        let mut hits = Vec::with_capacity(scored.len());
        for entry in scored {
            let Some(message) = load_message(txn, &entry.id)? else {
                continue;
            };
            let snippet = Snippet::extract(
                &self.analyzer,
                &message.body,
                &highlight,
                self.config.snippet_tokens,
                self.config.preview_chars,
            );
            hits.push(LexicalHit {
                message_id: entry.id,
                score: entry.score,
                snippet,
                subject: message.subject,
                sender: message.sender,
                date: message.date,
            });
        }

        log::debug!("Lexical search '{query}' returned {} hits", hits.len());
        Ok(hits)
    }
}

impl std::fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStore")
            .field("store", &self.store)
            .field("query_mode", &self.config.query_mode)
            .finish()
    }
}

// ============================================================================
// Matching
// ============================================================================

struct Scored {
    id: String,
    score: f32,
    date: Option<DateTime<Utc>>,
}

impl Ranked for Scored {
    fn rank_score(&self) -> f32 {
        self.score
    }

    fn rank_date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    fn rank_id(&self) -> &str {
        &self.id
    }
}

/// Evaluates query clauses against one candidate document.
///
/// Term presence comes from the postings; positions are only computed
/// (from the stored record) when a phrase needs them.
struct ClauseMatcher<'a> {
    txn: &'a ReadTransaction,
    analyzer: &'a Analyzer,
    postings: &'a HashMap<&'a str, TermPostings>,
    id: &'a str,
    fields: Option<(Vec<AnalyzedToken>, Vec<AnalyzedToken>)>,
}

impl ClauseMatcher<'_> {
    fn accepts(&mut self, query: &ParsedQuery) -> Result<bool> {
        for clause in query.clauses() {
            if clause.occur == Occur::Must && !self.matches(clause)? {
                return Ok(false);
            }
        }
        if !query.has_required() {
            let mut any = false;
            for clause in query.clauses().iter().filter(|c| c.occur == Occur::Should) {
                if self.matches(clause)? {
                    any = true;
                    break;
                }
            }
            if !any {
                return Ok(false);
            }
        }
        for clause in query.clauses() {
            if clause.occur == Occur::MustNot && self.matches(clause)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn matches(&mut self, clause: &Clause) -> Result<bool> {
        let present = clause.terms.iter().all(|term| {
            self.postings
                .get(term.as_str())
                .is_some_and(|docs| docs.contains_key(self.id))
        });
        if !present || !clause.needs_positions() {
            return Ok(present);
        }

        if self.fields.is_none() {
            let Some(message) = load_message(self.txn, self.id)? else {
                return Ok(false);
            };
            self.fields = Some((
                self.analyzer.analyze(&message.subject),
                self.analyzer.analyze(&message.body),
            ));
        }
        Ok(self
            .fields
            .as_ref()
            .is_some_and(|(subject, body)| {
                clause.phrase_matches(subject) || clause.phrase_matches(body)
            }))
    }
}

// ============================================================================
// Table helpers
// ============================================================================

fn load_message(txn: &ReadTransaction, message_id: &str) -> Result<Option<Message>> {
    let table = txn.open_table(tables::MESSAGES)?;
    match table.get(message_id)? {
        Some(record) => Ok(Some(serde_json::from_slice(record.value())?)),
        None => Ok(None),
    }
}

fn load_doc_stats(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    message_id: &str,
) -> Result<Option<DocStats>> {
    match table.get(message_id)? {
        Some(encoded) => Ok(Some(serde_json::from_slice(encoded.value())?)),
        None => Ok(None),
    }
}

fn load_postings(
    table: &impl ReadableTable<(&'static str, &'static str), (u32, u32)>,
    term: &str,
) -> Result<TermPostings> {
    let mut docs = HashMap::new();
    for entry in table.range((term, "")..)? {
        let (key, tf) = entry?;
        let (entry_term, message_id) = key.value();
        if entry_term != term {
            break;
        }
        docs.insert(message_id.to_string(), tf.value());
    }
    Ok(docs)
}

fn read_stats(txn: &ReadTransaction) -> Result<CorpusStats> {
    let table = txn.open_table(tables::CORPUS_STATS)?;
    let doc_count = table.get(DOC_COUNT)?.map(|v| v.value()).unwrap_or(0);
    let total_length = table.get(TOTAL_LENGTH)?.map(|v| v.value()).unwrap_or(0);
    Ok(CorpusStats {
        doc_count,
        total_length,
    })
}

fn adjust_stats(txn: &WriteTransaction, docs: i64, length: i64) -> Result<()> {
    let mut table = txn.open_table(tables::CORPUS_STATS)?;
    for (key, delta) in [(DOC_COUNT, docs), (TOTAL_LENGTH, length)] {
        let current = table.get(key)?.map(|v| v.value()).unwrap_or(0);
        table.insert(key, current.saturating_add_signed(delta))?;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
