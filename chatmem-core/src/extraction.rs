//! Extraction adapter contract — turning conversation text into memories.
//!
//! The adapter is an external collaborator (usually an LLM) that reads a
//! conversation turn or a character's onboarding description and replies
//! with proposed memories. This module owns everything on the engine's side
//! of that boundary:
//!
//! 1. **Request** — [`ExtractionRequest`] carries the input text plus the
//!    character's identity and voice.
//! 2. **Budget** — [`call_with_budget`] bounds each attempt with a timeout and
//!    retries a fixed number of times.
//! 3. **Parse** — [`parse_reply`] turns untyped reply text into a
//!    [`ParsedReply`]: proposals, an empty reply, or a parse error.
//! 4. **Validate** — [`validate_proposal`] accepts or drops each proposal on
//!    its own; partial success is normal.
//!
//! Inserting the validated proposals is done by
//! [`MemorySystem`](crate::system::MemorySystem), which never lets a failure
//! here escape into the conversation flow.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ExtractionConfig;
use crate::memory::{MemoryKind, MemoryRecord};
use crate::types::SubjectId;

// ---------------------------------------------------------------------------
// Request / adapter
// ---------------------------------------------------------------------------

/// Who the character is, so extracted memories match their voice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterContext {
    /// Display name of the character.
    pub name: String,
    /// Free-text persona / voice notes.
    pub persona: String,
}

impl CharacterContext {
    /// Build a character context.
    #[must_use]
    pub fn new(name: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persona: persona.into(),
        }
    }
}

/// The text an extraction call reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionInput {
    /// The latest exchange of a conversation.
    Conversation {
        /// Most recent user utterance.
        user_message: String,
        /// Most recent character utterance.
        character_reply: String,
    },
    /// A character's onboarding description, read once per subject.
    Onboarding {
        /// The description text.
        description: String,
    },
}

/// One call to the extraction adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    /// Subject the memories are for.
    pub subject: SubjectId,
    /// Character identity and voice.
    pub character: CharacterContext,
    /// Input text.
    pub input: ExtractionInput,
}

/// Transport-level failures of the extraction adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// The backend could not be reached or answered with an error.
    #[error("extraction transport failed: {0}")]
    Transport(String),

    /// A single attempt exceeded its timeout.
    #[error("extraction timed out after {0}ms")]
    Timeout(u64),

    /// No backend is configured; retrying will not help.
    #[error("extraction backend unavailable: {0}")]
    Unavailable(String),

    /// Every attempt in the budget failed.
    #[error("extraction failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// The last failure seen.
        last_error: String,
    },
}

/// The external collaborator that proposes memories.
///
/// Implementations return the backend's raw reply text; parsing and
/// validation happen on the engine side.
#[async_trait]
pub trait ExtractionAdapter: Send + Sync {
    /// Run one extraction call.
    async fn extract(&self, request: &ExtractionRequest) -> Result<String, ExtractionError>;
}

/// Call `adapter` with a per-attempt timeout and a fixed retry budget.
///
/// # Errors
///
/// Returns the backend's [`ExtractionError::Unavailable`] immediately, or
/// [`ExtractionError::RetriesExhausted`] once every attempt has failed.
pub async fn call_with_budget(
    adapter: &dyn ExtractionAdapter,
    request: &ExtractionRequest,
    config: &ExtractionConfig,
) -> Result<String, ExtractionError> {
    let timeout = Duration::from_millis(config.timeout_ms);
    let attempts = config.max_retries.saturating_add(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
        if attempt > 0 {
            debug!(
                subject = %request.subject,
                "Retrying extraction (attempt {}/{})",
                attempt + 1,
                attempts
            );
        }

        match tokio::time::timeout(timeout, adapter.extract(request)).await {
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(err @ ExtractionError::Unavailable(_))) => return Err(err),
            Ok(Err(err)) => {
                warn!(subject = %request.subject, error = %err, "Extraction attempt failed");
                last_error = err.to_string();
            }
            Err(_) => {
                warn!(
                    subject = %request.subject,
                    timeout_ms = config.timeout_ms,
                    "Extraction attempt timed out"
                );
                last_error = ExtractionError::Timeout(config.timeout_ms).to_string();
            }
        }
    }

    Err(ExtractionError::RetriesExhausted {
        attempts,
        last_error,
    })
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// A proposal that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedMemory {
    /// Memory kind.
    pub kind: MemoryKind,
    /// Non-blank content.
    pub content: String,
    /// Finite, positive importance (clamped on insert).
    pub importance: f64,
    /// Optional labels.
    pub tags: Vec<String>,
}

/// Typed result of parsing an adapter reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    /// The reply was well-formed.
    Proposals {
        /// Proposals that passed validation, in reply order.
        proposals: Vec<ProposedMemory>,
        /// Running summary, if the reply carried a non-blank one.
        summary: Option<String>,
        /// How many proposals were dropped by validation.
        rejected: usize,
    },
    /// The reply was blank or carried neither memories nor a summary.
    Empty,
    /// The reply was prose with no fenced block and no bare JSON.
    NoPayload,
    /// The reply could not be understood.
    ParseError(String),
}

/// Result handed back to the conversation flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionOutcome {
    /// Memories that were inserted.
    pub memories: Vec<MemoryRecord>,
    /// Running summary from the adapter, if any.
    pub summary: Option<String>,
}

impl ExtractionOutcome {
    /// The "nothing new this turn" outcome.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// The JSON payload of a reply: the first fenced code block if there is
/// one, otherwise the whole reply when it opens like JSON. `None` for prose.
fn json_payload(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after
            .strip_prefix("json")
            .or_else(|| after.strip_prefix("JSON"))
            .unwrap_or(after);
        if let Some(end) = after.find("```") {
            return Some(after[..end].trim());
        }
    }
    (trimmed.is_empty() || trimmed.starts_with(['{', '['])).then_some(trimmed)
}

/// Parse an adapter reply.
///
/// Accepts `{"memories": [...], "summary": "..."}` or a bare array of
/// proposals, optionally wrapped in a fenced ```` ```json ```` block.
/// A fenced block that fails to decode is a [`ParsedReply::ParseError`];
/// prose without any JSON is [`ParsedReply::NoPayload`].
#[must_use]
pub fn parse_reply(text: &str) -> ParsedReply {
    let Some(payload) = json_payload(text) else {
        return ParsedReply::NoPayload;
    };
    if payload.is_empty() {
        return ParsedReply::Empty;
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => return ParsedReply::ParseError(e.to_string()),
    };

    let (items, summary) = match &value {
        Value::Array(items) => (items.as_slice(), None),
        Value::Object(map) => {
            let items = match map.get("memories") {
                Some(Value::Array(items)) => items.as_slice(),
                None | Some(Value::Null) => &[],
                Some(_) => {
                    return ParsedReply::ParseError("`memories` is not an array".to_string());
                }
            };
            let summary = map
                .get("summary")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            (items, summary)
        }
        _ => return ParsedReply::ParseError("reply is neither an object nor an array".to_string()),
    };

    if items.is_empty() && summary.is_none() {
        return ParsedReply::Empty;
    }

    let mut proposals = Vec::with_capacity(items.len());
    let mut rejected = 0;
    for item in items {
        match validate_proposal(item) {
            Ok(proposal) => proposals.push(proposal),
            Err(reason) => {
                debug!(%reason, "Dropping invalid memory proposal");
                rejected += 1;
            }
        }
    }

    ParsedReply::Proposals {
        proposals,
        summary,
        rejected,
    }
}

/// Validate one proposed memory.
///
/// Requires a known `type` (or `kind`), non-blank `content`, and a finite
/// positive `importance` (a number or numeric string; zero means "not worth
/// recording"). `tags` is optional; non-string entries are ignored.
///
/// # Errors
///
/// Returns the reason the proposal was rejected.
pub fn validate_proposal(item: &Value) -> Result<ProposedMemory, String> {
    let obj = item.as_object().ok_or("proposal is not an object")?;

    let kind = obj
        .get("type")
        .or_else(|| obj.get("kind"))
        .and_then(Value::as_str)
        .ok_or("missing memory type")?
        .parse::<MemoryKind>()
        .map_err(|e| e.to_string())?;

    let content = obj
        .get("content")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or("missing or empty content")?
        .to_string();

    let importance = match obj.get("importance") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|i| i.is_finite() && *i > 0.0)
    .ok_or("missing or non-positive importance")?;

    let tags = obj
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(ProposedMemory {
        kind,
        content,
        importance,
        tags,
    })
}
