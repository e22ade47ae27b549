//! # chatmem-llm — LLM Extraction Adapter for chatmem
//!
//! Implements the core's [`ExtractionAdapter`](chatmem_core::ExtractionAdapter)
//! on top of a chat-completion backend:
//!   - **Ollama** (local, recommended default)
//!   - **OpenAI-compatible API** (any server speaking `/v1/chat/completions`)
//!
//! The adapter only renders prompts and returns the model's raw reply;
//! parsing, validation, timeouts and graceful degradation are handled by
//! `chatmem-core`.
//!
//! # Flow
//!
//! ```text
//! ExtractionRequest ──prompt──▶ LlmRequest ──client──▶ reply text ──▶ core parser
//! ```

pub mod client;
pub mod error;
pub mod extractor;
pub mod prompt;
pub mod types;

pub use client::{LlmClient, LlmProvider};
pub use error::LlmError;
pub use extractor::LlmExtractor;
pub use types::{LlmRequest, LlmResponse};
