//! Prompt-ready summary of what a character remembers.
//!
//! The summary is plain text meant to be dropped into a character's system
//! prompt. Only memories that are still meaningful after decay make it in,
//! grouped into fixed sections:
//!
//! ```text
//! [What I remember about the user]
//!
//! Basic facts:
//! - works as a nurse
//!
//! Preferences:
//! - loves rainy weather
//!
//! Weave these memories into the conversation naturally ...
//! ```

use std::fmt::Write as _;

use crate::config::MemoryConfig;
use crate::memory::{MemoryKind, MemoryRecord};
use crate::retrieval::{self, MemoryQuery};
use crate::types::Timestamp;

/// Returned when no memory qualifies for the summary.
pub const EMPTY_SUMMARY: &str = "No notable memories yet.";

/// First line of a non-empty summary.
pub const SUMMARY_HEADER: &str = "[What I remember about the user]";

/// Last line of a non-empty summary.
pub const SUMMARY_FOOTER: &str =
    "Weave these memories into the conversation naturally so the user feels truly remembered.";

/// Section heading for a kind.
#[must_use]
pub const fn section_label(kind: MemoryKind) -> &'static str {
    match kind {
        MemoryKind::Fact => "Basic facts:",
        MemoryKind::Preference => "Preferences:",
        MemoryKind::Event => "Recent events:",
        MemoryKind::Emotion => "Emotional state:",
        MemoryKind::Relationship => "Relationship:",
    }
}

/// Maximum lines rendered for a kind (`None` = no cap beyond the top-N).
fn section_cap(kind: MemoryKind, config: &MemoryConfig) -> Option<usize> {
    match kind {
        MemoryKind::Fact | MemoryKind::Preference => None,
        MemoryKind::Event => Some(config.summary_event_cap),
        MemoryKind::Emotion => Some(config.summary_emotion_cap),
        MemoryKind::Relationship => Some(config.summary_relationship_cap),
    }
}

/// Render the summary of `records` at `now`.
///
/// Memories with a decayed importance below `summary_min_importance` are
/// left out; the rest are ranked and the top `summary_top_n` are grouped
/// by kind in [`MemoryKind::ALL`] order. Within a section, rank order is
/// kept. Empty sections are omitted.
#[must_use]
pub fn render_summary(records: &[MemoryRecord], now: Timestamp, config: &MemoryConfig) -> String {
    let query = MemoryQuery::new()
        .min_importance(config.summary_min_importance)
        .limit(config.summary_top_n);
    let ranked = retrieval::rank(records, &query, now);

    if ranked.is_empty() {
        return EMPTY_SUMMARY.to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{SUMMARY_HEADER}");
    out.push('\n');

    for kind in MemoryKind::ALL {
        let cap = section_cap(kind, config).unwrap_or(usize::MAX);
        let mut lines = ranked
            .iter()
            .filter(|s| s.memory.kind == kind)
            .take(cap)
            .peekable();
        if lines.peek().is_none() {
            continue;
        }
        let _ = writeln!(out, "{}", section_label(kind));
        for scored in lines {
            let _ = writeln!(out, "- {}", scored.memory.content);
        }
        out.push('\n');
    }

    out.push_str(SUMMARY_FOOTER);
    out
}
