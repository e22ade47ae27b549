//! Exponential forgetting curve — memory decay model.
//!
//! A memory's effective importance at time `now` is:
//!
//! ```text
//!   decayed = importance × e^(-decay_rate × elapsed_days) + access_bonus
//!   access_bonus = min(access_count × 0.1, 2)
//! ```
//!
//! clamped into `[1, 10]`. The decay rate is fixed when the memory is formed:
//!
//! ```text
//!   decay_rate = base_rate(kind) × (11 - importance) / 10
//! ```
//!
//! so important memories fade slower than trivia of the same kind, and
//! memories that keep being recalled resist forgetting (rehearsal effect).
//!
//! All functions here are pure. Nothing in this module mutates a stored record.

use crate::memory::{MemoryKind, MemoryRecord};
use crate::types::Timestamp;

/// Lowest stored or reported importance.
pub const MIN_IMPORTANCE: f64 = 1.0;

/// Highest stored or reported importance.
pub const MAX_IMPORTANCE: f64 = 10.0;

/// Importance bonus earned per recall.
pub const ACCESS_BONUS_PER_RECALL: f64 = 0.1;

/// Cap on the recall bonus.
pub const MAX_ACCESS_BONUS: f64 = 2.0;

/// Clamp an importance value into `[1, 10]`.
#[must_use]
pub fn clamp_importance(importance: f64) -> f64 {
    importance.clamp(MIN_IMPORTANCE, MAX_IMPORTANCE)
}

/// Per-day decay constant for a memory of `kind` with (clamped) `importance`.
#[must_use]
pub fn decay_rate(kind: MemoryKind, importance: f64) -> f64 {
    let importance = clamp_importance(importance);
    kind.base_decay_rate() * (11.0 - importance) / 10.0
}

/// Fraction of the original importance retained after `elapsed_days`.
#[must_use]
pub fn retention(decay_rate: f64, elapsed_days: f64) -> f64 {
    (-decay_rate * elapsed_days.max(0.0)).exp()
}

/// Bonus importance from repeated recall.
#[must_use]
pub fn access_bonus(access_count: u32) -> f64 {
    (f64::from(access_count) * ACCESS_BONUS_PER_RECALL).min(MAX_ACCESS_BONUS)
}

/// Decayed importance *before* clamping.
///
/// This is the value eviction compares against its threshold: once clamped,
/// a decayed importance can never drop below [`MIN_IMPORTANCE`].
#[must_use]
pub fn raw_decayed_importance(record: &MemoryRecord, now: Timestamp) -> f64 {
    let elapsed_days = now.days_since(record.created_at);
    record.importance * retention(record.decay_rate, elapsed_days)
        + access_bonus(record.access_count)
}

/// Effective importance of `record` at `now`, clamped into `[1, 10]`.
#[must_use]
pub fn decayed_importance(record: &MemoryRecord, now: Timestamp) -> f64 {
    clamp_importance(raw_decayed_importance(record, now))
}

/// A copy of `record` whose `importance` is replaced by its decayed value.
/// Used for export and inspection; never written back to the store.
#[must_use]
pub fn decayed_copy(record: &MemoryRecord, now: Timestamp) -> MemoryRecord {
    let mut copy = record.clone();
    copy.importance = decayed_importance(record, now);
    copy
}
