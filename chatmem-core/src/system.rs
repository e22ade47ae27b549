//! Per-subject memory store.
//!
//! A [`MemorySystem`] owns every memory one character holds about one user.
//! All operations run to completion under a `parking_lot::Mutex`; the full
//! snapshot is written to the [`PersistenceEngine`] while the lock is still
//! held, so the last persisted state always equals the last in-memory state.
//! The lock is never held across the extraction adapter's await.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ChatmemConfig;
use crate::decay;
use crate::error::{ChatmemError, Result};
use crate::eviction;
use crate::extraction::{
    self, CharacterContext, ExtractionAdapter, ExtractionInput, ExtractionOutcome,
    ExtractionRequest, ParsedReply,
};
use crate::memory::{MemoryKind, MemoryRecord};
use crate::persistence::PersistenceEngine;
use crate::retrieval::{self, MemoryQuery, ScoredMemory};
use crate::summary;
use crate::types::{Clock, MemoryId, SubjectId, Timestamp};

const ONBOARDING_PENDING: u8 = 0;
const ONBOARDING_RUNNING: u8 = 1;
const ONBOARDING_DONE: u8 = 2;

/// Memory counts per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    /// Fact memories.
    pub fact: usize,
    /// Event memories.
    pub event: usize,
    /// Preference memories.
    pub preference: usize,
    /// Emotion memories.
    pub emotion: usize,
    /// Relationship memories.
    pub relationship: usize,
}

impl KindCounts {
    /// Count for one kind.
    #[must_use]
    pub const fn get(&self, kind: MemoryKind) -> usize {
        match kind {
            MemoryKind::Fact => self.fact,
            MemoryKind::Event => self.event,
            MemoryKind::Preference => self.preference,
            MemoryKind::Emotion => self.emotion,
            MemoryKind::Relationship => self.relationship,
        }
    }

    fn increment(&mut self, kind: MemoryKind) {
        let slot = match kind {
            MemoryKind::Fact => &mut self.fact,
            MemoryKind::Event => &mut self.event,
            MemoryKind::Preference => &mut self.preference,
            MemoryKind::Emotion => &mut self.emotion,
            MemoryKind::Relationship => &mut self.relationship,
        };
        *slot += 1;
    }
}

/// Aggregate view of a subject's store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStatistics {
    /// Number of stored memories.
    pub total: usize,
    /// Counts per kind.
    pub by_kind: KindCounts,
    /// Mean decayed importance (0 for an empty store).
    pub avg_importance: f64,
    /// Creation time of the oldest memory.
    pub oldest: Option<Timestamp>,
    /// Creation time of the newest memory.
    pub newest: Option<Timestamp>,
}

/// Every memory one character holds about one subject.
pub struct MemorySystem {
    subject: SubjectId,
    records: Mutex<Vec<MemoryRecord>>,
    onboarding: AtomicU8,
    store: Arc<PersistenceEngine>,
    clock: Arc<dyn Clock>,
    config: Arc<ChatmemConfig>,
}

impl std::fmt::Debug for MemorySystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySystem")
            .field("subject", &self.subject)
            .field("memories", &self.records.lock().len())
            .field("onboarding_extracted", &self.onboarding_extracted())
            .finish_non_exhaustive()
    }
}

impl MemorySystem {
    /// Load the subject's snapshot and onboarding flag from `store`.
    ///
    /// A snapshot that cannot be read is logged and ignored; the subject
    /// starts empty and the next mutation overwrites it.
    #[must_use]
    pub fn load(
        subject: SubjectId,
        store: Arc<PersistenceEngine>,
        clock: Arc<dyn Clock>,
        config: Arc<ChatmemConfig>,
    ) -> Self {
        let records = match store.load_snapshot(&subject) {
            Ok(Some(records)) => {
                debug!(subject = %subject, count = records.len(), "Loaded memory snapshot");
                records
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(subject = %subject, error = %e, "Memory snapshot unreadable, starting empty");
                Vec::new()
            }
        };

        let extracted = store.load_onboarding_flag(&subject).unwrap_or_else(|e| {
            warn!(subject = %subject, error = %e, "Onboarding flag unreadable, assuming not run");
            false
        });

        Self {
            subject,
            records: Mutex::new(records),
            onboarding: AtomicU8::new(if extracted {
                ONBOARDING_DONE
            } else {
                ONBOARDING_PENDING
            }),
            store,
            clock,
            config,
        }
    }

    /// The subject this store belongs to.
    #[must_use]
    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    /// Number of stored memories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the store holds no memories.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Stored records in insertion order, undecayed.
    #[must_use]
    pub fn records(&self) -> Vec<MemoryRecord> {
        self.records.lock().clone()
    }

    /// Look up one stored record.
    #[must_use]
    pub fn get(&self, id: MemoryId) -> Option<MemoryRecord> {
        self.records.lock().iter().find(|r| r.id == id).cloned()
    }

    /// Whether onboarding extraction has completed for this subject.
    #[must_use]
    pub fn onboarding_extracted(&self) -> bool {
        self.onboarding.load(Ordering::Acquire) == ONBOARDING_DONE
    }

    fn persist(&self, records: &[MemoryRecord]) {
        if let Err(e) = self.store.save_snapshot(&self.subject, records) {
            warn!(subject = %self.subject, error = %e, "Failed to persist memory snapshot");
        }
    }

    // -----------------------------------------------------------------------
    // Insert
    // -----------------------------------------------------------------------

    /// Store a new memory and persist the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ChatmemError::InvalidMemory`] for blank content or a
    /// non-finite importance; the store is left untouched.
    pub fn add_memory<I, S>(
        &self,
        kind: MemoryKind,
        content: &str,
        importance: f64,
        tags: I,
    ) -> Result<MemoryRecord>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let record = MemoryRecord::new(kind, content, importance, tags, self.clock.now())?;
        let mut records = self.records.lock();
        records.push(record.clone());
        self.persist(&records);
        debug!(
            subject = %self.subject,
            id = %record.id,
            kind = %record.kind,
            importance = record.importance,
            "Memory added"
        );
        Ok(record)
    }

    /// Store a new memory with the configured default importance and no tags.
    ///
    /// # Errors
    ///
    /// See [`MemorySystem::add_memory`].
    pub fn add_memory_with_defaults(&self, kind: MemoryKind, content: &str) -> Result<MemoryRecord> {
        let importance = self.config.memory.default_importance;
        self.add_memory(kind, content, importance, std::iter::empty::<&str>())
    }

    // -----------------------------------------------------------------------
    // Retrieval
    // -----------------------------------------------------------------------

    /// Rank memories for `query` without recording any access.
    #[must_use]
    pub fn rank(&self, query: &MemoryQuery) -> Vec<ScoredMemory> {
        let now = self.clock.now();
        retrieval::rank(&self.records.lock(), query, now)
    }

    /// Mark `ids` as retrieved now and persist. Unknown ids are ignored.
    /// Returns how many records were touched.
    pub fn record_access(&self, ids: &[MemoryId]) -> usize {
        let now = self.clock.now();
        let mut records = self.records.lock();
        let touched = touch(&mut records, ids, now);
        if touched > 0 {
            self.persist(&records);
        }
        touched
    }

    /// Rank memories for `query` and record an access on every returned one.
    ///
    /// Scores and decayed importances are computed before the access is
    /// recorded; the returned records carry the updated access bookkeeping.
    #[must_use]
    pub fn search_memories(&self, query: &MemoryQuery) -> Vec<ScoredMemory> {
        let now = self.clock.now();
        let mut records = self.records.lock();
        let mut results = retrieval::rank(&records, query, now);
        if results.is_empty() {
            return results;
        }

        let ids: Vec<MemoryId> = results.iter().map(|s| s.memory.id).collect();
        touch(&mut records, &ids, now);
        for scored in &mut results {
            scored.memory.record_access(now);
        }
        self.persist(&records);
        results
    }

    /// Multi-probe retrieval driven by free text.
    ///
    /// Every keyword of `context` runs as its own search (recording access
    /// on what it returns); the union is de-duplicated by id, re-scored and
    /// truncated to `limit` (the configured default when `None`).
    #[must_use]
    pub fn get_relevant_memories(&self, context: &str, limit: Option<usize>) -> Vec<ScoredMemory> {
        let limit = limit.unwrap_or(self.config.memory.relevant_limit);
        let keywords = retrieval::extract_keywords(context, self.config.memory.min_keyword_chars);
        if keywords.is_empty() || limit == 0 {
            return Vec::new();
        }

        let now = self.clock.now();
        let mut records = self.records.lock();
        let mut hits: Vec<MemoryId> = Vec::new();

        for keyword in &keywords {
            let query = MemoryQuery::new()
                .keyword(keyword.as_str())
                .limit(self.config.memory.per_keyword_limit);
            let ids: Vec<MemoryId> = retrieval::rank(&records, &query, now)
                .iter()
                .map(|s| s.memory.id)
                .collect();
            touch(&mut records, &ids, now);
            for id in ids {
                if !hits.contains(&id) {
                    hits.push(id);
                }
            }
        }

        if hits.is_empty() {
            return Vec::new();
        }
        self.persist(&records);

        let mut results: Vec<ScoredMemory> = hits
            .iter()
            .filter_map(|id| records.iter().find(|r| r.id == *id))
            .map(|record| retrieval::score_record(record, now))
            .collect();
        retrieval::sort_by_relevance(&mut results);
        results.truncate(limit);

        debug!(
            subject = %self.subject,
            keywords = keywords.len(),
            returned = results.len(),
            "Relevant memories retrieved"
        );
        results
    }

    /// Prompt-ready summary of what the character remembers.
    #[must_use]
    pub fn generate_memory_summary(&self) -> String {
        let now = self.clock.now();
        summary::render_summary(&self.records.lock(), now, &self.config.memory)
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    /// Delete every memory that has decayed below the cleanup threshold.
    /// Returns the deleted records.
    pub fn cleanup_memories(&self) -> Vec<MemoryRecord> {
        let now = self.clock.now();
        let mut records = self.records.lock();
        let result = eviction::evict_forgotten(
            std::mem::take(&mut *records),
            now,
            self.config.memory.cleanup_threshold,
        );
        *records = result.retained;

        if !result.forgotten.is_empty() {
            self.persist(&records);
            info!(
                subject = %self.subject,
                forgotten = result.forgotten.len(),
                retained = records.len(),
                "Memory cleanup complete"
            );
        }
        result.forgotten
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Counts, mean decayed importance and age range of the store.
    #[must_use]
    pub fn get_statistics(&self) -> MemoryStatistics {
        let now = self.clock.now();
        let records = self.records.lock();

        let mut by_kind = KindCounts::default();
        let mut importance_sum = 0.0;
        for record in records.iter() {
            by_kind.increment(record.kind);
            importance_sum += decay::decayed_importance(record, now);
        }

        #[allow(clippy::cast_precision_loss)]
        let avg_importance = if records.is_empty() {
            0.0
        } else {
            importance_sum / records.len() as f64
        };

        MemoryStatistics {
            total: records.len(),
            by_kind,
            avg_importance,
            oldest: records.iter().map(|r| r.created_at).min(),
            newest: records.iter().map(|r| r.created_at).max(),
        }
    }

    /// Decayed copies of every memory, most important first.
    #[must_use]
    pub fn export_memories(&self) -> Vec<MemoryRecord> {
        let now = self.clock.now();
        let mut exported: Vec<MemoryRecord> = self
            .records
            .lock()
            .iter()
            .map(|r| decay::decayed_copy(r, now))
            .collect();
        exported.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        exported
    }

    /// [`MemorySystem::export_memories`] as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ChatmemError::Serialization`] if encoding fails.
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.export_memories())
            .map_err(|e| ChatmemError::Serialization(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Extraction
    // -----------------------------------------------------------------------

    /// Ask `adapter` for memories in the latest exchange and store the valid
    /// ones. Never fails: any adapter problem yields an empty outcome.
    pub async fn extract_from_conversation(
        &self,
        adapter: &dyn ExtractionAdapter,
        character: &CharacterContext,
        user_message: &str,
        character_reply: &str,
    ) -> ExtractionOutcome {
        let request = ExtractionRequest {
            subject: self.subject.clone(),
            character: character.clone(),
            input: ExtractionInput::Conversation {
                user_message: user_message.to_string(),
                character_reply: character_reply.to_string(),
            },
        };
        match extraction::call_with_budget(adapter, &request, &self.config.extraction).await {
            Ok(text) => self.apply_reply(extraction::parse_reply(&text), None),
            Err(e) => {
                warn!(subject = %self.subject, error = %e, "Conversation extraction failed");
                ExtractionOutcome::empty()
            }
        }
    }

    /// Read the character's onboarding description once per subject.
    ///
    /// Skipped when onboarding already ran (or is running). A blank
    /// description completes onboarding without calling the adapter. The
    /// flag is persisted once the adapter answers, even with nothing to
    /// record or with prose instead of JSON. A transport failure or a JSON
    /// block that does not decode leaves it unset so a later call can retry.
    pub async fn extract_onboarding(
        &self,
        adapter: &dyn ExtractionAdapter,
        character: &CharacterContext,
        description: &str,
    ) -> ExtractionOutcome {
        if self
            .onboarding
            .compare_exchange(
                ONBOARDING_PENDING,
                ONBOARDING_RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            debug!(subject = %self.subject, "Onboarding extraction already handled");
            return ExtractionOutcome::empty();
        }

        if description.trim().is_empty() {
            self.finish_onboarding();
            return ExtractionOutcome::empty();
        }

        let request = ExtractionRequest {
            subject: self.subject.clone(),
            character: character.clone(),
            input: ExtractionInput::Onboarding {
                description: description.to_string(),
            },
        };

        let reply = extraction::call_with_budget(adapter, &request, &self.config.extraction).await;
        match reply.map(|text| extraction::parse_reply(&text)) {
            Ok(ParsedReply::ParseError(reason)) => {
                warn!(subject = %self.subject, %reason, "Onboarding reply unreadable");
                self.onboarding.store(ONBOARDING_PENDING, Ordering::Release);
                ExtractionOutcome::empty()
            }
            Ok(parsed) => {
                let tag = self.config.memory.onboarding_tag.as_str();
                let outcome = self.apply_reply(parsed, Some(tag));
                self.finish_onboarding();
                info!(
                    subject = %self.subject,
                    memories = outcome.memories.len(),
                    "Onboarding extraction complete"
                );
                outcome
            }
            Err(e) => {
                warn!(subject = %self.subject, error = %e, "Onboarding extraction failed");
                self.onboarding.store(ONBOARDING_PENDING, Ordering::Release);
                ExtractionOutcome::empty()
            }
        }
    }

    fn finish_onboarding(&self) {
        self.onboarding.store(ONBOARDING_DONE, Ordering::Release);
        if let Err(e) = self.store.save_onboarding_flag(&self.subject, true) {
            warn!(subject = %self.subject, error = %e, "Failed to persist onboarding flag");
        }
    }

    fn apply_reply(&self, parsed: ParsedReply, extra_tag: Option<&str>) -> ExtractionOutcome {
        let (proposals, summary, rejected) = match parsed {
            ParsedReply::Proposals {
                proposals,
                summary,
                rejected,
            } => (proposals, summary, rejected),
            ParsedReply::Empty => return ExtractionOutcome::empty(),
            ParsedReply::NoPayload => {
                debug!(subject = %self.subject, "Extraction reply carried no JSON");
                return ExtractionOutcome::empty();
            }
            ParsedReply::ParseError(reason) => {
                warn!(subject = %self.subject, %reason, "Extraction reply unreadable");
                return ExtractionOutcome::empty();
            }
        };

        let mut memories = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            let tags = proposal.tags.iter().map(String::as_str).chain(extra_tag);
            match self.add_memory(proposal.kind, &proposal.content, proposal.importance, tags) {
                Ok(record) => memories.push(record),
                Err(e) => debug!(subject = %self.subject, error = %e, "Proposal rejected on insert"),
            }
        }

        if rejected > 0 {
            debug!(subject = %self.subject, rejected, "Invalid proposals dropped");
        }
        ExtractionOutcome { memories, summary }
    }
}

/// Record an access on each record whose id is in `ids`.
fn touch(records: &mut [MemoryRecord], ids: &[MemoryId], now: Timestamp) -> usize {
    let mut touched = 0;
    for record in records.iter_mut().filter(|r| ids.contains(&r.id)) {
        record.record_access(now);
        touched += 1;
    }
    touched
}
