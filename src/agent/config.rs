//! Agent configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::gemini::DEFAULT_API_BASE;
use crate::sandbox::{SandboxConfig, ScriptLanguage};

/// Default system instruction sent with every request (inline or via the cache)
pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are an expert assistant for the 'yt' volumetric data analysis library.";

/// Configuration for the agent session and orchestrator
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model to use for generation (e.g., "gemini-2.0-flash-001")
    pub model: String,
    /// Directory of markdown knowledge documents
    pub knowledge_base_dir: PathBuf,
    /// Append-only interaction log
    pub history_file: PathBuf,
    /// Root of the Generative Language REST API
    pub api_base: String,
    /// Environment variable holding the API credential
    pub api_key_env: String,
    /// Whether to keep the knowledge base in a server-side cache
    pub caching_enabled: bool,
    /// Contexts shorter than this (in characters) are never cached
    pub min_cache_chars: usize,
    /// Lifetime requested for new cache entries
    pub cache_ttl: Duration,
    /// Sampling temperature for generation
    pub temperature: f32,
    /// Timeout for each remote call
    pub request_timeout: Duration,
    /// Timeout for sandboxed execution (`None` waits indefinitely)
    pub execution_timeout: Option<Duration>,
    /// Python interpreter used by the sandbox
    pub python: String,
    /// Custom system instructions (uses `DEFAULT_SYSTEM_INSTRUCTION` if empty)
    pub system_instructions: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash-001".to_string(),
            knowledge_base_dir: PathBuf::from("knowledge_base"),
            history_file: PathBuf::from("yt_agent_history.log"),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            caching_enabled: true,
            min_cache_chars: 1000,
            cache_ttl: Duration::from_secs(7200),
            temperature: 0.2,
            request_timeout: Duration::from_secs(120),
            execution_timeout: Some(Duration::from_secs(300)),
            python: "python3".to_string(),
            system_instructions: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Defaults overlaid with `YT_AGENT_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (the environment in production)
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = get("YT_AGENT_MODEL") {
            self.model = model;
        }
        if let Some(dir) = get("YT_AGENT_KNOWLEDGE_BASE") {
            self.knowledge_base_dir = PathBuf::from(dir);
        }
        if let Some(file) = get("YT_AGENT_HISTORY") {
            self.history_file = PathBuf::from(file);
        }
        if let Some(base) = get("YT_AGENT_API_BASE") {
            self.api_base = base;
        }
        if let Some(flag) = get("YT_AGENT_NO_CACHE") {
            self.caching_enabled = !matches!(flag.trim(), "1" | "true" | "yes");
        }
        if let Some(python) = get("YT_AGENT_PYTHON") {
            self.python = python;
        }
        if let Some(secs) = get("YT_AGENT_EXEC_TIMEOUT").and_then(|s| s.trim().parse::<u64>().ok()) {
            self.execution_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        self
    }

    /// System instructions joined into one block
    pub fn system_instruction_text(&self) -> String {
        if self.system_instructions.is_empty() {
            DEFAULT_SYSTEM_INSTRUCTION.to_string()
        } else {
            self.system_instructions.join("\n")
        }
    }

    /// Sandbox settings derived from this configuration
    pub fn sandbox(&self) -> SandboxConfig {
        SandboxConfig {
            language: ScriptLanguage::Python,
            interpreter: self.python.clone(),
            timeout: self.execution_timeout,
        }
    }
}
