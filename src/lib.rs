//! yt-agent - knowledge-grounded code generation for the yt analysis library
//!
//! Turns natural-language requests into Python code using a Gemini model
//! grounded in a local markdown knowledge base, optionally runs the code in
//! a child interpreter, and keeps an append-only history of interactions.
//!
//! # Modules
//!
//! - `agent` - session, orchestrator, caching, prompts, extraction, history
//! - `gemini` - Generative Language API client for generation and context caching
//! - `knowledge` - knowledge base loading, notebook ingestion, topic authoring
//! - `sandbox` - child-process execution with output capture
//! - `metrics` - Prometheus metrics for observability
//! - `tracing` - logging and optional OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use yt_agent::{AgentConfig, AgentOrchestrator, AgentSession};
//!
//! let session = AgentSession::establish(AgentConfig::from_env()).await;
//! let agent = AgentOrchestrator::new(session);
//! let report = agent.run("plot a density slice of the dataset", true).await;
//! ```

pub mod agent;
pub mod gemini;
pub mod knowledge;
pub mod metrics;
pub mod sandbox;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentConfig, AgentOrchestrator, AgentSession, RunReport};
pub use knowledge::{Context, KnowledgeBaseLoader};
pub use sandbox::{ExecutionResult, SandboxExecutor};
