//! The query engine: lexical, semantic and hybrid search over one store.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mailfind_core::{Error, MailStore, Message, Result};
use mailfind_fts::{LexicalHit, MessageStore, SearchConfig, Snippet};
use mailfind_vector::{
    BackendSelection, EmbeddingConfig, EmbeddingProvider, VectorStore, embed_with_deadline,
};
use redb::ReadTransaction;
use serde::{Deserialize, Serialize};

use crate::hybrid::{FusedHit, HybridConfig, fuse};

/// Which signal ranks the results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// BM25 over subject and body.
    Lexical,
    /// Cosine similarity against stored vectors of the active backend.
    Semantic,
    /// Both, fused.
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" => Ok(Self::Lexical),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(Error::invalid_data(format!(
                "unknown search mode '{other}' (expected lexical, semantic or hybrid)"
            ))),
        }
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub date: Option<DateTime<Utc>>,
    pub snippet: Snippet,
    /// Raw BM25 score, when the lexical family found the message.
    pub lexical_score: Option<f32>,
    /// Raw cosine score, when the semantic family found the message.
    pub semantic_score: Option<f32>,
    /// The score the result list is ordered by.
    pub fused_score: f32,
}

impl QueryResult {
    fn from_lexical(hit: LexicalHit) -> Self {
        Self {
            fused_score: hit.score,
            lexical_score: Some(hit.score),
            semantic_score: None,
            message_id: hit.message_id,
            subject: hit.subject,
            sender: hit.sender,
            date: hit.date,
            snippet: hit.snippet,
        }
    }

    fn from_message(message: Message, snippet: Snippet) -> Self {
        Self {
            message_id: message.message_id,
            subject: message.subject,
            sender: message.sender,
            date: message.date,
            snippet,
            lexical_score: None,
            semantic_score: None,
            fused_score: 0.0,
        }
    }
}

/// Answers queries against one mail store.
///
/// Cheap to clone; every search opens its own read snapshot, so an engine
/// can be shared across tasks while an ingest is running.
#[derive(Clone)]
pub struct QueryEngine {
    messages: MessageStore,
    vectors: VectorStore,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    hybrid: HybridConfig,
    timeout: Duration,
}

impl QueryEngine {
    /// An engine with no embedding backend (lexical only).
    pub fn new(store: MailStore, search: SearchConfig) -> Self {
        Self {
            messages: MessageStore::new(store.clone(), search),
            vectors: VectorStore::new(store),
            provider: None,
            hybrid: HybridConfig::default(),
            timeout: EmbeddingConfig::default().timeout(),
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

    pub fn with_hybrid(mut self, hybrid: HybridConfig) -> Self {
        self.hybrid = hybrid;
        self
    }

    /// Deadline for embedding the query text.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    /// Name of the active embedding backend, if any.
    pub fn backend_name(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.name())
    }

    /// Fetch one message by id.
    pub fn show(&self, message_id: &str) -> Result<Message> {
        self.messages.get(message_id)
    }

    /// Run `query` in `mode` and return at most `limit` results.
    ///
    /// Results are ordered by fused score, then most recent date, then
    /// message id. A blank query returns nothing.
    pub async fn search(
        &self,
        query: &str,
        mode: SearchMode,
        limit: usize,
    ) -> Result<Vec<QueryResult>> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        log::debug!("Searching ({mode}, limit {limit}): {query}");

        match mode {
            SearchMode::Lexical => self.lexical(query, limit),
            SearchMode::Semantic => {
                let provider = self.require_provider(mode)?;
                self.semantic(provider, query, limit).await
            }
            SearchMode::Hybrid => match self.provider.as_deref() {
                Some(provider) => self.hybrid(provider, query, limit).await,
                None if self.hybrid.allow_lexical_fallback => {
                    log::warn!("No embedding backend active; hybrid search degraded to lexical");
                    self.lexical(query, limit)
                }
                None => Err(no_provider(mode)),
            },
        }
    }

    fn require_provider(&self, mode: SearchMode) -> Result<&dyn EmbeddingProvider> {
        self.provider.as_deref().ok_or_else(|| no_provider(mode))
    }

    fn lexical(&self, query: &str, limit: usize) -> Result<Vec<QueryResult>> {
        let hits = self.messages.lexical_search(query, limit)?;
        Ok(hits.into_iter().map(QueryResult::from_lexical).collect())
    }

    async fn semantic(
        &self,
        provider: &dyn EmbeddingProvider,
        query: &str,
        limit: usize,
    ) -> Result<Vec<QueryResult>> {
        let Some(vector) = self.query_vector(provider, query).await? else {
            return Ok(Vec::new());
        };

        let txn = self.messages.mail_store().begin_read()?;
        let hits = self
            .vectors
            .semantic_search_in(&txn, &vector, provider.name(), limit)?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(mut result) = self.load_result(&txn, &hit.message_id, query)? else {
                continue;
            };
            result.semantic_score = Some(hit.score);
            result.fused_score = hit.score;
            results.push(result);
        }
        Ok(results)
    }

    /// Both candidate pools and every record loaded for them come from
    /// one snapshot, so a concurrent ingest is seen entirely or not at all.
    async fn hybrid(
        &self,
        provider: &dyn EmbeddingProvider,
        query: &str,
        limit: usize,
    ) -> Result<Vec<QueryResult>> {
        let vector = self.query_vector(provider, query).await?;

        let pool = self.hybrid.candidate_pool(limit);
        let txn = self.messages.mail_store().begin_read()?;
        let lexical = self.messages.lexical_search_in(&txn, query, pool)?;
        let semantic = match &vector {
            Some(vector) => self
                .vectors
                .semantic_search_in(&txn, vector, provider.name(), pool)?,
            None => Vec::new(),
        };
        log::debug!(
            "Hybrid candidates: {} lexical, {} semantic",
            lexical.len(),
            semantic.len()
        );

        let fused = fuse(&lexical, &semantic, &self.hybrid, limit);

        let mut lexical: HashMap<String, LexicalHit> = lexical
            .into_iter()
            .map(|hit| (hit.message_id.clone(), hit))
            .collect();

        let mut results = Vec::with_capacity(fused.len());
        for FusedHit {
            message_id,
            fused_score,
            lexical_score,
            semantic_score,
            ..
        } in fused
        {
            let result = match lexical.remove(&message_id) {
                Some(hit) => Some(QueryResult::from_lexical(hit)),
                None => self.load_result(&txn, &message_id, query)?,
            };
            let Some(mut result) = result else {
                continue;
            };
            result.lexical_score = lexical_score;
            result.semantic_score = semantic_score;
            result.fused_score = fused_score;
            results.push(result);
        }
        Ok(results)
    }

    /// Embed the query; `None` when it has no embeddable content.
    async fn query_vector(
        &self,
        provider: &dyn EmbeddingProvider,
        query: &str,
    ) -> Result<Option<Vec<f32>>> {
        let vector = embed_with_deadline(provider, query, self.timeout).await?;
        if vector.iter().all(|v| *v == 0.0) {
            log::debug!("Query has no embeddable content for {}", provider.name());
            return Ok(None);
        }
        Ok(Some(vector))
    }

    /// A result built from the stored message, with a query snippet.
    fn load_result(
        &self,
        txn: &ReadTransaction,
        message_id: &str,
        query: &str,
    ) -> Result<Option<QueryResult>> {
        match self.messages.get_in(txn, message_id) {
            Ok(message) => {
                let snippet = self.messages.snippet_for(&message, query);
                Ok(Some(QueryResult::from_message(message, snippet)))
            }
            Err(err) if err.is_not_found() => {
                log::warn!("Vector for {message_id} has no stored message; skipping");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

fn no_provider(mode: SearchMode) -> Error {
    Error::backend_unavailable(format!(
        "{mode} search needs an embedding backend, but none is active"
    ))
}

impl fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEngine")
            .field("backend", &self.backend_name())
            .field("hybrid", &self.hybrid)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
