//! The memory record — one atomic fact a character holds about the user.
//!
//! Records are created through [`MemoryRecord::new`], which validates the
//! content, clamps importance into `[1, 10]` and fixes the decay rate once.
//! The stored importance never changes afterwards; decay is applied only to
//! derived copies (see [`crate::decay`]).

pub mod kind;

pub use kind::MemoryKind;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::decay;
use crate::error::{ChatmemError, Result};
use crate::types::{MemoryId, Timestamp};

/// A single memory about the conversation subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier, stable for the record's lifetime.
    pub id: MemoryId,
    /// Category of the memory.
    pub kind: MemoryKind,
    /// The substance of the memory, from the character's point of view.
    pub content: String,
    /// Stored importance in `[1, 10]`.
    pub importance: f64,
    /// When the memory was formed.
    pub created_at: Timestamp,
    /// Free-text labels used for keyword retrieval.
    pub tags: BTreeSet<String>,
    /// Per-day decay constant, fixed at creation.
    pub decay_rate: f64,
    /// Most recent retrieval.
    pub last_accessed_at: Timestamp,
    /// How many times this memory was returned by a query.
    pub access_count: u32,
}

impl MemoryRecord {
    /// Create a new memory.
    ///
    /// # Errors
    ///
    /// Returns [`ChatmemError::InvalidMemory`] if `content` is blank or
    /// `importance` is not a finite number.
    pub fn new<I, S>(
        kind: MemoryKind,
        content: &str,
        importance: f64,
        tags: I,
        now: Timestamp,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatmemError::InvalidMemory {
                reason: "content is empty".to_string(),
            });
        }
        if !importance.is_finite() {
            return Err(ChatmemError::InvalidMemory {
                reason: format!("importance {importance} is not a finite number"),
            });
        }

        let importance = decay::clamp_importance(importance);
        let tags = tags
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(Self {
            id: MemoryId::new(),
            kind,
            content: content.to_string(),
            importance,
            created_at: now,
            tags,
            decay_rate: decay::decay_rate(kind, importance),
            last_accessed_at: now,
            access_count: 0,
        })
    }

    /// Bring a record read from storage back within the stored-value bounds:
    /// importance clamped into `[1, 10]`, a negative or non-finite decay
    /// rate recomputed from kind and importance. `None` when the record has
    /// blank content or a non-finite importance.
    #[must_use]
    pub fn sanitized(mut self) -> Option<Self> {
        if self.content.trim().is_empty() || !self.importance.is_finite() {
            return None;
        }
        self.importance = decay::clamp_importance(self.importance);
        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            self.decay_rate = decay::decay_rate(self.kind, self.importance);
        }
        Some(self)
    }

    /// Record a retrieval.
    pub fn record_access(&mut self, now: Timestamp) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = now;
    }

    /// Case-insensitive substring match against the content or any tag.
    /// `needle` must already be lowercase.
    #[must_use]
    pub fn matches_keyword(&self, needle: &str) -> bool {
        self.content.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}
