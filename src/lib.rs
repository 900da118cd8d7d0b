//! quaestio - LLM pipeline for multiple-choice medical exam questions.
//!
//! ## Architecture
//!
//! Three agent roles drive each question through its lifecycle:
//! - **Creator**: drafts the question with the key at a dictated position
//! - **Commentator**: blind-reviews the draft without seeing the key
//! - **Validator**: approves or rejects from the draft plus its review
//!
//! Agents call an [`provider::LlmProvider`] adapter (OpenAI or Anthropic)
//! that owns the request lifecycle: semaphore-gated admission, wall-clock
//! timeout, rate-limit retry with backoff, typed-output validation, and
//! deterministic cost accounting.
//!
//! Finished questions land in a SQLite store with per-question metrics and
//! checkpoint summaries; approved questions export to a spreadsheet.

pub mod agent;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod provider;
pub mod store;

// Re-exports for convenience
pub use agent::{CommentatorAgent, CreatorAgent, PromptLibrary, SubtopicGenerator, ValidatorAgent};
pub use export::SpreadsheetExporter;
pub use models::{Config, LlmError, QuaestioError, QuestionRecord, QuestionStatus, Result};
pub use pipeline::{PositionBalancer, QuestionPipeline};
pub use provider::{
    AnthropicProvider, BackoffPolicy, GenerationRequest, GenerationResult, LlmProvider,
    OpenAiProvider, PricingTable,
};
pub use store::QuestionStore;
