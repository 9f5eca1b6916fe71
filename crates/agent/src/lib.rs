//! Conversation runtime - substitution recommendations and follow-up handling
//!
//! This crate provides the "brain" of the restock system - the conversation
//! engine that:
//! - Turns a fresh candidate set into ranked, batched recommendations
//! - Classifies follow-up messages (more options / closing / generic chat)
//! - Serves successive batches from persisted per-conversation state
//! - Composes customer-facing prose through the text-generation port
//!
//! # Architecture
//!
//! One inbound turn follows a constrained loop:
//! 1. **Selection** (`restock-core`) - quantity pre-filter, relevance filter,
//!    deterministic ranking
//! 2. **Batching** (`restock-core`) - fixed-size slices over the ranked
//!    snapshot, cursor committed only after successful delivery
//! 3. **Composition** (`composer`) - prompt construction for the generation
//!    collaborator, templated fallbacks when it fails
//! 4. **Persistence** (`restock-db`) - recommendation state and the
//!    append-only conversation log
//!
//! # Safety Principle
//!
//! The LLM is strictly a prose renderer. It NEVER selects, orders, or invents
//! products. Which alternatives a customer may ever see, and in what order,
//! is decided by the deterministic core before any prompt is built.

pub mod composer;
pub mod engine;
pub mod llm;
pub mod relevance_llm;

pub use engine::{ChatRequest, ChatResponse, ConversationEngine, EngineError, OptionItem, TurnOutcome};
pub use llm::{strip_deliberation, HttpLlmClient, LlmClient, LlmError};
pub use relevance_llm::LlmRelevanceFilter;
