//! Configuration and result types for full-text search.

use chrono::{DateTime, Utc};
use mailfind_core::Ranked;
use serde::{Deserialize, Serialize};

use crate::snippet::Snippet;

// ============================================================================
// Configuration
// ============================================================================

/// How plain (unprefixed) query terms are combined.
///
/// - **Smart** (default): all required for 1-2 terms, any for 3+
/// - **And**: every term must match
/// - **Or**: any term may match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Smart,
    And,
    Or,
}

/// Full-text search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Combination rule for plain terms.
    #[serde(default)]
    pub query_mode: QueryMode,

    /// Weight of a subject occurrence relative to a body occurrence.
    #[serde(default = "default_subject_boost")]
    pub subject_boost: f32,

    /// BM25 term-frequency saturation.
    #[serde(default = "default_k1")]
    pub bm25_k1: f32,

    /// BM25 length normalization.
    #[serde(default = "default_b")]
    pub bm25_b: f32,

    /// Analyzed tokens shown in a match snippet.
    #[serde(default = "default_snippet_tokens")]
    pub snippet_tokens: usize,

    /// Characters shown when no body term matched.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Default search result limit.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

fn default_subject_boost() -> f32 {
    2.0
}

fn default_k1() -> f32 {
    1.2
}

fn default_b() -> f32 {
    0.75
}

fn default_snippet_tokens() -> usize {
    16
}

fn default_preview_chars() -> usize {
    160
}

fn default_limit() -> usize {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query_mode: QueryMode::default(),
            subject_boost: default_subject_boost(),
            bm25_k1: default_k1(),
            bm25_b: default_b(),
            snippet_tokens: default_snippet_tokens(),
            preview_chars: default_preview_chars(),
            default_limit: default_limit(),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// One lexical match.
#[derive(Debug, Clone, Serialize)]
pub struct LexicalHit {
    pub message_id: String,
    /// BM25 score; always positive.
    pub score: f32,
    pub snippet: Snippet,
    pub subject: String,
    pub sender: String,
    pub date: Option<DateTime<Utc>>,
}

impl Ranked for LexicalHit {
    fn rank_score(&self) -> f32 {
        self.score
    }

    fn rank_date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    fn rank_id(&self) -> &str {
        &self.message_id
    }
}

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The message id was new.
    Inserted,
    /// An existing message was replaced.
    Updated,
}

impl UpsertOutcome {
    pub fn is_update(self) -> bool {
        matches!(self, Self::Updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_config_defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.query_mode, QueryMode::Smart);
        assert_eq!(config.subject_boost, 2.0);
        assert_eq!(config.bm25_k1, 1.2);
        assert_eq!(config.bm25_b, 0.75);
        assert_eq!(config.snippet_tokens, 16);
        assert_eq!(config.preview_chars, 160);
    }

    #[test]
    fn test_search_config_partial_deserialize() {
        let config: SearchConfig = serde_json::from_str(r#"{"query_mode": "or"}"#).unwrap();
        assert_eq!(config.query_mode, QueryMode::Or);
        assert_eq!(config.default_limit, 10);
    }
}
