//! Importance-driven eviction.
//!
//! The only way a memory leaves a store. A record is forgotten when its
//! decayed importance, before clamping, falls below the cleanup threshold
//! (1.0 by default). Nothing is ever evicted for being queried or for
//! pushing the store past a count.
//!
//! ```text
//!  importance ──decay──▶ raw decayed importance ──< threshold──▶ forgotten
//!                                 │
//!                                 └──≥ threshold──▶ retained
//! ```

use crate::decay;
use crate::memory::MemoryRecord;
use crate::types::Timestamp;

/// Result of an eviction pass.
#[derive(Debug, Default)]
pub struct EvictionResult {
    /// Memories that stay, in their original order.
    pub retained: Vec<MemoryRecord>,
    /// Memories that decayed below the threshold.
    pub forgotten: Vec<MemoryRecord>,
}

/// Whether `record` has decayed below `threshold` at `now`.
#[must_use]
pub fn is_forgotten(record: &MemoryRecord, now: Timestamp, threshold: f64) -> bool {
    decay::raw_decayed_importance(record, now) < threshold
}

/// Partition `records` into retained and forgotten memories.
#[must_use]
pub fn evict_forgotten(
    records: Vec<MemoryRecord>,
    now: Timestamp,
    threshold: f64,
) -> EvictionResult {
    let (forgotten, retained) = records
        .into_iter()
        .partition(|record| is_forgotten(record, now, threshold));
    EvictionResult {
        retained,
        forgotten,
    }
}
