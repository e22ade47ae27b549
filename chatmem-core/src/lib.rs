//! # chatmem Core Library
//!
//! Per-character long-term memory for roleplay chat.
//!
//! Every conversation subject gets a [`MemorySystem`] holding structured
//! memories about the user, each one of five kinds:
//!
//! - **Fact** — name, job, schedule, belongings
//! - **Event** — things the user lived through or plans
//! - **Preference** — likes, dislikes, opinions
//! - **Emotion** — strong feelings the user expressed (fades fastest)
//! - **Relationship** — how the user sees the character (fades slowest)
//!
//! Memories decay exponentially with time, are reinforced by recall, are
//! ranked by a single deterministic relevance score, and are deleted only
//! once their importance has faded away. New memories come from an
//! [`ExtractionAdapter`] that reads conversation text; failures there never
//! reach the conversation.
//!
//! ## Quick start
//!
//! ```no_run
//! use chatmem_core::{ChatmemConfig, MemoryKind, MemoryRegistry};
//!
//! let registry = MemoryRegistry::open(ChatmemConfig::default())?;
//! let kai = registry.get_system("kai");
//! kai.add_memory(MemoryKind::Preference, "loves rainy weather", 6.0, ["weather"])?;
//! let relevant = kai.get_relevant_memories("what a rainy day", None);
//! println!("{}", kai.generate_memory_summary());
//! # Ok::<(), chatmem_core::ChatmemError>(())
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod decay;
pub mod error;
pub mod eviction;
pub mod extraction;
pub mod memory;
pub mod persistence;
pub mod registry;
pub mod retrieval;
pub mod summary;
pub mod system;
pub mod telemetry;
pub mod types;

pub use config::ChatmemConfig;
pub use error::ChatmemError;
pub use extraction::{
    CharacterContext, ExtractionAdapter, ExtractionError, ExtractionOutcome, ExtractionRequest,
};
pub use memory::{MemoryKind, MemoryRecord};
pub use registry::MemoryRegistry;
pub use retrieval::{MemoryQuery, ScoredMemory};
pub use system::{MemoryStatistics, MemorySystem};
pub use types::*;
