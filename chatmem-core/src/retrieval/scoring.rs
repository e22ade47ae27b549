//! Per-factor scoring functions for memory ranking.
//!
//! Score = Importance(m) + Recency(m) + Reinforcement(m)
//!
//! Where:
//!   Importance(m)    = decayed_importance × 10              (10..=100)
//!   Recency(m)       = max(0, 100 − elapsed_days)           (0..=100)
//!   Reinforcement(m) = min(access_count × 5, 50)            (0..=50)
//!
//! Recency saturates at zero after 100 days, so a memory aged 100 days and
//! one aged five years tie on that axis.

use crate::decay;
use crate::memory::MemoryRecord;
use crate::types::{RelevanceScore, Timestamp};

/// Weight applied to decayed importance.
const IMPORTANCE_WEIGHT: f64 = 10.0;

/// Recency credit for a brand-new memory; one point is lost per day.
const RECENCY_HORIZON_DAYS: f64 = 100.0;

/// Points per recall, and their cap.
const REINFORCEMENT_PER_RECALL: f64 = 5.0;
const MAX_REINFORCEMENT: f64 = 50.0;

/// Breakdown of a relevance score into its component factors.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreBreakdown {
    /// Importance factor contribution.
    pub importance: f64,
    /// Recency factor contribution.
    pub recency: f64,
    /// Reinforcement-by-use contribution.
    pub reinforcement: f64,
}

impl ScoreBreakdown {
    /// Sum of all factors.
    #[must_use]
    pub fn total(&self) -> RelevanceScore {
        RelevanceScore::new(self.importance + self.recency + self.reinforcement)
    }
}

/// Compute the full score breakdown for a single memory at `now`.
#[must_use]
pub fn compute_breakdown(record: &MemoryRecord, now: Timestamp) -> ScoreBreakdown {
    let decayed = decay::decayed_importance(record, now);
    breakdown_from_parts(decayed, now.days_since(record.created_at), record.access_count)
}

/// Score breakdown from already-computed inputs.
#[must_use]
pub fn breakdown_from_parts(
    decayed_importance: f64,
    elapsed_days: f64,
    access_count: u32,
) -> ScoreBreakdown {
    ScoreBreakdown {
        importance: decayed_importance * IMPORTANCE_WEIGHT,
        recency: (RECENCY_HORIZON_DAYS - elapsed_days).max(0.0),
        reinforcement: (f64::from(access_count) * REINFORCEMENT_PER_RECALL).min(MAX_REINFORCEMENT),
    }
}

/// Relevance score of `record` at `now`.
#[must_use]
pub fn relevance_score(record: &MemoryRecord, now: Timestamp) -> RelevanceScore {
    compute_breakdown(record, now).total()
}
