//! Memory retrieval — filtering and deterministic ranking.
//!
//! Ranking is pure: [`rank`] computes decayed importance for every record,
//! filters, scores and sorts, but never touches access bookkeeping. The
//! access side effect of a query lives in
//! [`MemorySystem::record_access`](crate::system::MemorySystem::record_access).
//!
//! Sorting is stable, so ties keep insertion order and identical inputs
//! always produce identically ordered output.

pub mod scoring;

pub use scoring::ScoreBreakdown;

use std::cmp::Reverse;
use std::collections::HashSet;

use crate::decay;
use crate::memory::{MemoryKind, MemoryRecord};
use crate::types::{RelevanceScore, Timestamp};

/// Filters for a memory search. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryQuery {
    /// Exact kind match.
    pub kind: Option<MemoryKind>,
    /// Lower bound on *decayed* importance.
    pub min_importance: Option<f64>,
    /// Case-insensitive substring of the content or of any tag.
    pub keyword: Option<String>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl MemoryQuery {
    /// An unfiltered query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one kind.
    #[must_use]
    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Require a decayed importance of at least `min`.
    #[must_use]
    pub fn min_importance(mut self, min: f64) -> Self {
        self.min_importance = Some(min);
        self
    }

    /// Require `keyword` in the content or a tag.
    #[must_use]
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// Keep at most `limit` results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A ranked retrieval result.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    /// The retrieved memory.
    pub memory: MemoryRecord,
    /// Decayed importance at query time.
    pub decayed_importance: f64,
    /// Combined relevance score at query time.
    pub score: RelevanceScore,
    /// Per-factor breakdown (useful for inspection).
    pub breakdown: ScoreBreakdown,
}

/// Score a single record at `now`.
#[must_use]
pub fn score_record(record: &MemoryRecord, now: Timestamp) -> ScoredMemory {
    let decayed = decay::decayed_importance(record, now);
    let breakdown = scoring::breakdown_from_parts(
        decayed,
        now.days_since(record.created_at),
        record.access_count,
    );
    ScoredMemory {
        memory: record.clone(),
        decayed_importance: decayed,
        score: breakdown.total(),
        breakdown,
    }
}

/// Filter, score and sort `records` for `query`. Pure: nothing is mutated.
#[must_use]
pub fn rank(records: &[MemoryRecord], query: &MemoryQuery, now: Timestamp) -> Vec<ScoredMemory> {
    let needle = query
        .keyword
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(str::to_lowercase);

    let mut results: Vec<ScoredMemory> = records
        .iter()
        .map(|record| score_record(record, now))
        .filter(|s| query.kind.is_none_or(|kind| s.memory.kind == kind))
        .filter(|s| query.min_importance.is_none_or(|min| s.decayed_importance >= min))
        .filter(|s| needle.as_deref().is_none_or(|n| s.memory.matches_keyword(n)))
        .collect();

    sort_by_relevance(&mut results);

    if let Some(limit) = query.limit {
        results.truncate(limit);
    }
    results
}

/// Stable sort, highest score first.
pub fn sort_by_relevance(results: &mut [ScoredMemory]) {
    results.sort_by_key(|s| Reverse(s.score));
}

/// Split free text into lowercase probe keywords.
///
/// Tokens are separated by whitespace and punctuation; tokens shorter than
/// `min_chars` characters are discarded, as are repeats.
#[must_use]
pub fn extract_keywords(text: &str, min_chars: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= min_chars)
        .map(str::to_lowercase)
        .filter(|token| seen.insert(token.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: Timestamp = Timestamp::from_millis(1_700_000_000_000);

    fn rec(kind: MemoryKind, content: &str, importance: f64, tags: &[&str]) -> MemoryRecord {
        MemoryRecord::new(kind, content, importance, tags.iter().copied(), T0).expect("valid")
    }

    fn contents(results: &[ScoredMemory]) -> Vec<&str> {
        results.iter().map(|s| s.memory.content.as_str()).collect()
    }

    #[test]
    fn empty_store_ranks_nothing() {
        assert!(rank(&[], &MemoryQuery::new(), T0).is_empty());
    }

    #[test]
    fn keyword_matches_content_or_tag_only() {
        let records = vec![
            rec(MemoryKind::Preference, "likes tea", 5.0, &[]),
            rec(MemoryKind::Fact, "visits the cafe every morning", 5.0, &["drink"]),
        ];
        let tea = rank(&records, &MemoryQuery::new().keyword("TEA"), T0);
        let drink = rank(&records, &MemoryQuery::new().keyword("drink"), T0);
        assert_eq!(contents(&tea), vec!["likes tea"]);
        assert_eq!(contents(&drink), vec!["visits the cafe every morning"]);
    }

    #[test]
    fn keyword_whitespace_is_part_of_the_needle() {
        let records = vec![
            rec(MemoryKind::Preference, "likes tea", 5.0, &[]),
            rec(MemoryKind::Fact, "tea time daily", 5.0, &[]),
        ];
        let spaced = rank(&records, &MemoryQuery::new().keyword(" tea"), T0);
        assert_eq!(contents(&spaced), vec!["likes tea"]);

        let trailing = rank(&records, &MemoryQuery::new().keyword("tea "), T0);
        assert_eq!(contents(&trailing), vec!["tea time daily"]);
    }

    #[test]
    fn kind_filter_is_exact() {
        let records = vec![
            rec(MemoryKind::Fact, "is a nurse", 6.0, &[]),
            rec(MemoryKind::Emotion, "was anxious about the exam", 6.0, &[]),
        ];
        let facts = rank(&records, &MemoryQuery::new().kind(MemoryKind::Fact), T0);
        assert_eq!(contents(&facts), vec!["is a nurse"]);
    }

    #[test]
    fn min_importance_uses_decayed_value() {
        let records = vec![rec(MemoryKind::Emotion, "felt lonely", 8.0, &[])];
        let query = MemoryQuery::new().min_importance(7.0);
        assert_eq!(rank(&records, &query, T0).len(), 1);
        assert!(rank(&records, &query, T0.plus_days(10.0)).is_empty());
        assert_eq!(records[0].importance, 8.0);
    }

    #[test]
    fn sorted_by_score_then_insertion_order() {
        let records = vec![
            rec(MemoryKind::Fact, "first", 5.0, &[]),
            rec(MemoryKind::Fact, "second", 5.0, &[]),
            rec(MemoryKind::Fact, "important", 9.0, &[]),
        ];
        let ranked = rank(&records, &MemoryQuery::new(), T0);
        assert_eq!(contents(&ranked), vec!["important", "first", "second"]);
    }

    #[test]
    fn limit_truncates() {
        let records: Vec<_> = (0..10)
            .map(|i| rec(MemoryKind::Fact, &format!("fact {i}"), f64::from(i), &[]))
            .collect();
        let ranked = rank(&records, &MemoryQuery::new().limit(3), T0);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].memory.content, "fact 9");
    }

    #[test]
    fn ranking_does_not_touch_access_counts() {
        let records = vec![rec(MemoryKind::Fact, "has a dog", 5.0, &[])];
        let _ = rank(&records, &MemoryQuery::new(), T0);
        assert_eq!(records[0].access_count, 0);
    }

    #[test]
    fn keywords_split_on_punctuation_and_drop_short_tokens() {
        let keywords = extract_keywords("I love tea, and rainy days! Tea?", 2);
        assert_eq!(keywords, vec!["love", "tea", "and", "rainy", "days"]);
    }

    #[test]
    fn keywords_handle_cjk_punctuation() {
        let keywords = extract_keywords("喜欢喝茶，讨厌下雨。", 2);
        assert_eq!(keywords, vec!["喜欢喝茶", "讨厌下雨"]);
    }
}
