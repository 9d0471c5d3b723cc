//! Hybrid ranking: fusing lexical and semantic result lists.
//!
//! BM25 scores are unbounded and cosine scores live in [-1, 1], so the two
//! families are never added raw. Two strategies are available.
//!
//! # Min-max fusion (default)
//!
//! Each family is rescaled to [0, 1] within its own candidate pool:
//! `n(s) = (s - min) / (max - min)`, or 1.0 for every member when all
//! scores are equal. A message missing from one family gets 0.0 for it.
//!
//! `fused(d) = w_lex · n_lex(d) + w_sem · n_sem(d)`
//!
//! # Reciprocal rank fusion
//!
//! `fused(d) = Σ w_i / (k + rank_i(d))`
//!
//! where `rank_i(d)` is the 1-based rank of `d` in list `i` and `k` damps
//! the advantage of the very top ranks (default 60). Lists a message is
//! absent from contribute nothing.
//!
//! Both strategies depend only on score order and relative spacing, so
//! rescaling either family's scores by a positive constant leaves the
//! fused ranking unchanged.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mailfind_core::Ranked;
use mailfind_core::rank::sort_and_truncate;
use serde::{Deserialize, Serialize};

/// Default RRF damping constant.
pub const DEFAULT_RRF_K: u32 = 60;

// ============================================================================
// Configuration
// ============================================================================

/// How the two result families are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Weighted sum of per-family min-max normalised scores.
    #[default]
    MinMax,
    /// Weighted reciprocal rank fusion.
    ReciprocalRank {
        #[serde(default = "default_rrf_k")]
        k: u32,
    },
}

fn default_rrf_k() -> u32 {
    DEFAULT_RRF_K
}

/// Hybrid search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Weight of the lexical family.
    #[serde(default = "default_weight")]
    pub lexical_weight: f32,

    /// Weight of the semantic family.
    #[serde(default = "default_weight")]
    pub semantic_weight: f32,

    /// Each family retrieves `limit * candidate_multiplier` candidates.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Degrade hybrid queries to lexical when no embedding backend is active.
    #[serde(default = "default_allow_lexical_fallback")]
    pub allow_lexical_fallback: bool,

    #[serde(default)]
    pub strategy: FusionStrategy,
}

fn default_weight() -> f32 {
    0.5
}

fn default_candidate_multiplier() -> usize {
    4
}

fn default_allow_lexical_fallback() -> bool {
    true
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            lexical_weight: default_weight(),
            semantic_weight: default_weight(),
            candidate_multiplier: default_candidate_multiplier(),
            allow_lexical_fallback: default_allow_lexical_fallback(),
            strategy: FusionStrategy::default(),
        }
    }
}

impl HybridConfig {
    /// Candidates retrieved per family for a request of `limit` results.
    pub fn candidate_pool(&self, limit: usize) -> usize {
        limit.saturating_mul(self.candidate_multiplier).max(limit)
    }
}

// ============================================================================
// Fused results
// ============================================================================

/// Which families a fused hit was found by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    Lexical,
    Semantic,
    Both,
}

/// One message after fusion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedHit {
    pub message_id: String,
    pub fused_score: f32,
    /// Raw BM25 score, if the lexical family found the message.
    pub lexical_score: Option<f32>,
    /// Raw cosine score, if the semantic family found the message.
    pub semantic_score: Option<f32>,
    pub date: Option<DateTime<Utc>>,
    pub source: HitSource,
}

impl Ranked for FusedHit {
    fn rank_score(&self) -> f32 {
        self.fused_score
    }

    fn rank_date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    fn rank_id(&self) -> &str {
        &self.message_id
    }
}

/// Rescale `scores` to [0, 1]; an all-equal family maps to 1.0.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let Some(min) = scores.iter().copied().reduce(f32::min) else {
        return Vec::new();
    };
    let max = scores.iter().copied().fold(min, f32::max);
    let range = max - min;
    if range <= 0.0 {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// Fuse two ranked candidate lists and keep the best `limit`.
///
/// Both inputs must already be in rank order (as returned by the lexical
/// and semantic searches); reciprocal rank fusion reads ranks from list
/// position. The result is ordered by fused score, then date (newest
/// first), then message id.
pub fn fuse<L, S>(lexical: &[L], semantic: &[S], config: &HybridConfig, limit: usize) -> Vec<FusedHit>
where
    L: Ranked,
    S: Ranked,
{
    let lexical_signal = family_signal(lexical, config.strategy);
    let semantic_signal = family_signal(semantic, config.strategy);

    let mut merged: HashMap<&str, FusedHit> = HashMap::new();

    for (hit, signal) in lexical.iter().zip(&lexical_signal) {
        let entry = merged.entry(hit.rank_id()).or_insert_with(|| empty_hit(hit));
        entry.lexical_score = Some(hit.rank_score());
        entry.fused_score += config.lexical_weight * signal;
    }

    for (hit, signal) in semantic.iter().zip(&semantic_signal) {
        let entry = merged.entry(hit.rank_id()).or_insert_with(|| empty_hit(hit));
        entry.semantic_score = Some(hit.rank_score());
        entry.fused_score += config.semantic_weight * signal;
        if entry.date.is_none() {
            entry.date = hit.rank_date();
        }
    }

    let mut results: Vec<FusedHit> = merged
        .into_values()
        .map(|mut hit| {
            hit.source = match (hit.lexical_score, hit.semantic_score) {
                (Some(_), Some(_)) => HitSource::Both,
                (None, Some(_)) => HitSource::Semantic,
                _ => HitSource::Lexical,
            };
            hit
        })
        .collect();

    sort_and_truncate(&mut results, limit);
    results
}

/// Per-candidate contribution of one family, before weighting.
fn family_signal<T: Ranked>(hits: &[T], strategy: FusionStrategy) -> Vec<f32> {
    match strategy {
        FusionStrategy::MinMax => {
            let scores: Vec<f32> = hits.iter().map(Ranked::rank_score).collect();
            min_max_normalize(&scores)
        }
        FusionStrategy::ReciprocalRank { k } => (0..hits.len())
            .map(|rank| 1.0 / (k as f32 + (rank + 1) as f32))
            .collect(),
    }
}

fn empty_hit<T: Ranked>(hit: &T) -> FusedHit {
    FusedHit {
        message_id: hit.rank_id().to_string(),
        fused_score: 0.0,
        lexical_score: None,
        semantic_score: None,
        date: hit.rank_date(),
        source: HitSource::Lexical,
    }
}

// ============================================================================
// Tests
// ============================================================================
