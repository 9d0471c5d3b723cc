//! Result ordering shared by every search path.
//!
//! Higher score first; equal scores go to the most recent message, then
//! messages without a date, then by id so the order is total. A NaN score
//! ranks below every number, so a misbehaving backend cannot break the sort.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

/// Anything that can be placed in a ranked result list.
pub trait Ranked {
    /// The score being ranked on (higher is better).
    fn rank_score(&self) -> f32;
    /// Sent date of the underlying message.
    fn rank_date(&self) -> Option<DateTime<Utc>>;
    /// Message identifier, the final tie-breaker.
    fn rank_id(&self) -> &str;
}

/// Compare two scores in rank order; `Less` means `a` ranks ahead of `b`.
pub fn compare_scores(a: f32, b: f32) -> Ordering {
    canonical(b).total_cmp(&canonical(a))
}

// NaN sinks to the bottom; -0.0 ties with 0.0.
fn canonical(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score + 0.0
    }
}

/// Compare two ranked items; `Less` means `a` ranks ahead of `b`.
pub fn compare<T: Ranked + ?Sized>(a: &T, b: &T) -> Ordering {
    compare_scores(a.rank_score(), b.rank_score())
        .then_with(|| match (a.rank_date(), b.rank_date()) {
            (Some(da), Some(db)) => db.cmp(&da),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.rank_id().cmp(b.rank_id()))
}

/// Sort in rank order and keep the first `limit` items.
pub fn sort_and_truncate<T: Ranked>(items: &mut Vec<T>, limit: usize) {
    items.sort_by(|a, b| compare(a, b));
    items.truncate(limit);
}

// ============================================================================
// Tests
// ============================================================================
