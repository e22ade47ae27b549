//! Memory kinds — the closed taxonomy of what a character can remember.
//!
//! Each kind carries a base decay rate encoding how quickly that sort of
//! memory is expected to fade. Relationship memories fade slowest, emotional
//! memories fastest.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChatmemError;

/// The category of a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// Objective facts about the user (name, job, schedule, belongings).
    Fact,
    /// Specific things the user lived through or plans to do.
    Event,
    /// Likes, dislikes, values and opinions.
    Preference,
    /// Strong emotional states the user expressed.
    Emotion,
    /// How the user sees their relationship with the character.
    Relationship,
}

impl MemoryKind {
    /// All kinds, in summary bucket order.
    pub const ALL: [Self; 5] = [
        Self::Fact,
        Self::Preference,
        Self::Event,
        Self::Emotion,
        Self::Relationship,
    ];

    /// Per-day base decay rate for this kind.
    #[must_use]
    pub const fn base_decay_rate(self) -> f64 {
        match self {
            Self::Fact => 0.1,
            Self::Event => 0.2,
            Self::Preference => 0.05,
            Self::Emotion => 0.3,
            Self::Relationship => 0.02,
        }
    }

    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Event => "event",
            Self::Preference => "preference",
            Self::Emotion => "emotion",
            Self::Relationship => "relationship",
        }
    }
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryKind {
    type Err = ChatmemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fact" => Ok(Self::Fact),
            "event" => Ok(Self::Event),
            "preference" => Ok(Self::Preference),
            "emotion" => Ok(Self::Emotion),
            "relationship" => Ok(Self::Relationship),
            _ => Err(ChatmemError::UnknownKind(s.to_string())),
        }
    }
}
