//! BM25 Okapi scoring.
//!
//! Subject and body are scored as one document with a weighted term
//! frequency (`subject_boost * tf_subject + tf_body`), so a subject hit
//! counts more without double-counting document length.

use serde::{Deserialize, Serialize};

/// BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
    pub subject_boost: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            subject_boost: 2.0,
        }
    }
}

/// Corpus-wide counters, maintained on every upsert and delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub doc_count: u64,
    pub total_length: u64,
}

impl CorpusStats {
    pub fn average_doc_length(&self) -> f32 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_length as f32 / self.doc_count as f32
        }
    }
}

/// IDF: ln((N - df + 0.5) / (df + 0.5) + 1), never negative.
pub fn idf(doc_count: u64, doc_freq: u64) -> f32 {
    let n = doc_count as f32;
    let df = doc_freq as f32;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Field-weighted term frequency.
pub fn weighted_tf(subject_tf: u32, body_tf: u32, params: &Bm25Params) -> f32 {
    params.subject_boost * subject_tf as f32 + body_tf as f32
}

/// Score of one term in one document.
pub fn term_score(idf: f32, tf: f32, doc_length: u32, avgdl: f32, params: &Bm25Params) -> f32 {
    if tf <= 0.0 {
        return 0.0;
    }
    let dl = doc_length as f32;
    let norm = if avgdl > 0.0 { dl / avgdl } else { 1.0 };
    let tf_norm = (tf * (params.k1 + 1.0)) / (tf + params.k1 * (1.0 - params.b + params.b * norm));
    idf * tf_norm
}
