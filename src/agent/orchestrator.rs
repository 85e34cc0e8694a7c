//! Agent orchestrator - the request/response lifecycle
//!
//! ```text
//! Idle → GeneratingCode ─┬─► CodeReady ──┬─► Executing → Completed
//!                        │               └─► Completed (not approved)
//!                        └─► GenerationFailed → Completed
//! ```
//!
//! Every step degrades instead of failing: a missing credential yields
//! placeholder code, a failed model call yields code that is a comment
//! describing the error, and a fault in the executed code is captured in
//! the report. The interaction is logged whether or not code ran.

use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::gemini::GeminiError;
use crate::metrics::{GENERATIONS, LLM_CALL_TIME};
use crate::sandbox::{ExecutionResult, SandboxExecutor};

use super::extract::CodeExtractor;
use super::history::InteractionLogger;
use super::prompt::PromptBuilder;
use super::session::{AgentSession, LlmCapability};

/// Marker present in every placeholder produced without a model
pub const OFFLINE_MARKER: &str = "[Offline]";

/// Output log recorded when the generated code was not run
pub const EXECUTION_SKIPPED: &str = "(Execution skipped)";

/// Lifecycle state of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Idle,
    GeneratingCode,
    CodeReady,
    GenerationFailed,
    Executing,
    Completed,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentState::Idle => "idle",
            AgentState::GeneratingCode => "generating_code",
            AgentState::CodeReady => "code_ready",
            AgentState::GenerationFailed => "generation_failed",
            AgentState::Executing => "executing",
            AgentState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Where the generated code came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSource {
    Model,
    /// No model available; explanatory stand-in
    Placeholder,
    /// The model call failed; the code is a comment describing the error
    ErrorComment,
}

/// Result of `generate`
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub code: String,
    /// `CodeReady` or `GenerationFailed`
    pub state: AgentState,
    pub source: CodeSource,
    /// Whether the answering call referenced the context cache
    pub used_cache: bool,
    pub duration_ms: f64,
}

impl GenerationOutcome {
    pub fn is_ready(&self) -> bool {
        self.state == AgentState::CodeReady
    }
}

/// Decides whether generated code may run when auto-execute is off
#[async_trait]
pub trait ExecutionGate: Send + Sync {
    async fn approve(&self, code: &str) -> bool;
}

/// Runs everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ExecutionGate for AutoApprove {
    async fn approve(&self, _code: &str) -> bool {
        true
    }
}

/// Runs nothing; the default for non-interactive callers
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverApprove;

#[async_trait]
impl ExecutionGate for NeverApprove {
    async fn approve(&self, _code: &str) -> bool {
        false
    }
}

/// Outcome of a full `run`
#[derive(Debug, Clone)]
pub struct RunReport {
    pub query: String,
    pub generation: GenerationOutcome,
    /// `None` when execution was skipped
    pub execution: Option<ExecutionResult>,
    pub success: bool,
    /// Text written to the interaction history
    pub output_log: String,
    pub state: AgentState,
}

impl RunReport {
    pub fn executed(&self) -> bool {
        self.execution.is_some()
    }
}

/// Composes generation, execution and history logging over one session
pub struct AgentOrchestrator {
    session: AgentSession,
    prompts: PromptBuilder,
    extractor: CodeExtractor,
    executor: SandboxExecutor,
    logger: InteractionLogger,
    gate: Box<dyn ExecutionGate>,
    state: Mutex<AgentState>,
}

impl AgentOrchestrator {
    /// Create an orchestrator; components are derived from the session config
    pub fn new(session: AgentSession) -> Self {
        let config = session.config();
        let prompts = PromptBuilder::new(config.temperature);
        let executor = SandboxExecutor::new(config.sandbox());
        let logger = InteractionLogger::new(config.history_file.clone());

        Self {
            session,
            prompts,
            extractor: CodeExtractor,
            executor,
            logger,
            gate: Box::new(NeverApprove),
            state: Mutex::new(AgentState::Idle),
        }
    }

    /// Replace the sandbox executor
    pub fn with_executor(mut self, executor: SandboxExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the gate consulted when auto-execute is off
    pub fn with_gate(mut self, gate: impl ExecutionGate + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    pub fn session(&self) -> &AgentSession {
        &self.session
    }

    pub fn logger(&self) -> &InteractionLogger {
        &self.logger
    }

    /// State of the most recent request
    pub fn state(&self) -> AgentState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, next: AgentState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug!(from = %*state, to = %next, "State transition");
        *state = next;
    }

    /// Turn a natural-language query into code
    pub async fn generate(&self, query: &str) -> GenerationOutcome {
        let start = Instant::now();
        self.transition(AgentState::GeneratingCode);

        let service = match self.session.capability() {
            LlmCapability::Connected(service) => service.clone(),
            LlmCapability::Disconnected(reason) => {
                info!(%reason, "Returning placeholder code");
                GENERATIONS.with_label_values(&["offline"]).inc();
                self.transition(AgentState::CodeReady);
                return GenerationOutcome {
                    code: placeholder_code(query, &reason.to_string(), self.session.context().char_len()),
                    state: AgentState::CodeReady,
                    source: CodeSource::Placeholder,
                    used_cache: false,
                    duration_ms: elapsed_ms(start),
                };
            }
        };

        let model = self.session.config().model.as_str();
        let mut handle = self.session.cache_handle().await;

        let (result, used_cache) = loop {
            let request = self.prompts.build(
                query,
                self.session.context(),
                self.session.system_instructions(),
                handle.as_ref(),
            );
            let mode = if request.use_cache { "cached" } else { "inline" };
            let used_cache = request.use_cache;

            let call_start = Instant::now();
            let result = service.generate_content(model, &request.to_wire()).await;
            LLM_CALL_TIME
                .with_label_values(&[model, mode])
                .observe(call_start.elapsed().as_secs_f64());

            match result {
                Err(e) if used_cache && e.is_cache_invalid() => {
                    if let Some(stale) = handle.take() {
                        self.session.invalidate_cache(&stale.remote_id).await;
                    }
                    info!(error = %e, "Retrying with inline context");
                }
                result => break (result, used_cache),
            }
        };

        let outcome = match result {
            Ok(text) => {
                let code = self.extractor.extract(&text).code;
                info!(code_len = code.len(), used_cache, "Code generated");
                GENERATIONS.with_label_values(&["success"]).inc();
                GenerationOutcome {
                    code,
                    state: AgentState::CodeReady,
                    source: CodeSource::Model,
                    used_cache,
                    duration_ms: elapsed_ms(start),
                }
            }
            Err(e) => {
                warn!(error = %e, "Code generation failed");
                GENERATIONS.with_label_values(&["error"]).inc();
                GenerationOutcome {
                    code: error_comment(&e),
                    state: AgentState::GenerationFailed,
                    source: CodeSource::ErrorComment,
                    used_cache,
                    duration_ms: elapsed_ms(start),
                }
            }
        };

        self.transition(outcome.state);
        outcome
    }

    /// Execute (if allowed) and log an already generated result
    pub async fn complete(&self, query: &str, generation: GenerationOutcome, auto_execute: bool) -> RunReport {
        let approved = match generation.state {
            AgentState::GenerationFailed => false,
            _ if auto_execute => true,
            _ => self.gate.approve(&generation.code).await,
        };

        let execution = if approved {
            self.transition(AgentState::Executing);
            Some(self.executor.execute(&generation.code, None, None).await)
        } else {
            debug!(state = %generation.state, auto_execute, "Execution skipped");
            None
        };

        let (success, output_log) = match &execution {
            Some(result) => (result.success(), result.output_log()),
            None => (false, EXECUTION_SKIPPED.to_string()),
        };

        self.logger.log(query, &generation.code, success, &output_log);
        self.transition(AgentState::Completed);

        RunReport {
            query: query.to_string(),
            generation,
            execution,
            success,
            output_log,
            state: AgentState::Completed,
        }
    }

    /// Generate, optionally execute, and log
    pub async fn run(&self, query: &str, auto_execute: bool) -> RunReport {
        let request_id = uuid::Uuid::now_v7().to_string();
        let span = info_span!("agent_run", request_id = %request_id, otel.name = "agent_run");

        async {
            info!(query = %query, auto_execute, "Processing query");
            let generation = self.generate(query).await;
            self.complete(query, generation, auto_execute).await
        }
        .instrument(span)
        .await
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stand-in code when no model is available. Runs cleanly and imports nothing.
fn placeholder_code(query: &str, reason: &str, context_chars: usize) -> String {
    format!(
        "# {} No LLM available: {}\n\
         # Agent received query: '{}'\n\
         # {} characters of documentation loaded.\n\
         print('No LLM available. Set the API credential to generate real code.')",
        OFFLINE_MARKER,
        reason,
        single_line(query),
        context_chars
    )
}

/// Inert code describing a generation failure
fn error_comment(error: &GeminiError) -> String {
    error
        .to_string()
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                format!("# Error generating code: {}", line)
            } else {
                format!("# {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
