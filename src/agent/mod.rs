//! Agent module for knowledge-grounded code generation
//!
//! This module provides the pipeline that turns a natural-language query
//! into runnable Python:
//! - knowledge base context, cached server-side when large enough
//! - prompt construction (cached or inline context)
//! - code extraction from the model reply
//! - sandboxed execution and interaction logging
//!
//! # Architecture
//!
//! ```text
//! AgentSession::establish (once)
//!   KnowledgeBaseLoader → Context → ContentCacheManager → CacheHandle?
//!                  ↓
//! AgentOrchestrator::run(query)
//!   PromptBuilder → Gemini generateContent → CodeExtractor
//!                  ↓
//!   ExecutionGate / auto-execute → SandboxExecutor (child interpreter)
//!                  ↓
//!   InteractionLogger (append-only history)
//! ```

pub mod cache;
pub mod config;
pub mod extract;
pub mod history;
pub mod orchestrator;
pub mod prompt;
pub mod session;
pub mod worker;

pub use cache::{CacheHandle, CachePolicy, ContentCacheManager, ContentHash};
pub use config::AgentConfig;
pub use extract::{CodeExtractor, ExtractedCode};
pub use history::{InteractionLogger, InteractionRecord};
pub use orchestrator::{
    AgentOrchestrator, AgentState, AutoApprove, CodeSource, ExecutionGate, GenerationOutcome,
    NeverApprove, RunReport, EXECUTION_SKIPPED, OFFLINE_MARKER,
};
pub use prompt::{GenerationRequest, PromptBuilder};
pub use session::{AgentSession, DisconnectReason, LlmCapability};
pub use worker::{SlotBusy, TaskEvent, TaskSlot};
