//! Agent session: the state constructed once at startup
//!
//! Holds the resolved remote capability, the loaded knowledge base context
//! and the cache handle. The cache is set up before the session is handed
//! out, so generation only ever reads it, except to drop a handle the
//! service reports as gone.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::gemini::{ContentService, GeminiClient};
use crate::knowledge::{Context, KnowledgeBaseLoader};
use crate::metrics::CACHE_EVENTS;

use super::cache::{CacheHandle, CachePolicy, ContentCacheManager};
use super::config::AgentConfig;

/// Why no model is available
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The credential environment variable is unset or empty
    MissingCredential { var: String },
    /// The HTTP client could not be constructed
    ClientUnavailable(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::MissingCredential { var } => write!(f, "{} is not set", var),
            DisconnectReason::ClientUnavailable(msg) => write!(f, "client unavailable: {}", msg),
        }
    }
}

/// Whether the agent can reach a model
#[derive(Clone)]
pub enum LlmCapability {
    Connected(Arc<dyn ContentService>),
    Disconnected(DisconnectReason),
}

impl LlmCapability {
    /// Resolve from the process environment
    pub fn from_env(config: &AgentConfig) -> Self {
        Self::resolve(config, |key| std::env::var(key).ok())
    }

    /// Resolve using `lookup` to read the credential
    pub fn resolve(config: &AgentConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_key = match lookup(&config.api_key_env).filter(|k| !k.trim().is_empty()) {
            Some(key) => key,
            None => {
                return LlmCapability::Disconnected(DisconnectReason::MissingCredential {
                    var: config.api_key_env.clone(),
                })
            }
        };

        match GeminiClient::new(&config.api_base, api_key.trim(), config.request_timeout) {
            Ok(client) => LlmCapability::Connected(Arc::new(client)),
            Err(e) => LlmCapability::Disconnected(DisconnectReason::ClientUnavailable(e.to_string())),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, LlmCapability::Connected(_))
    }
}

impl std::fmt::Debug for LlmCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmCapability::Connected(_) => f.write_str("Connected"),
            LlmCapability::Disconnected(reason) => f.debug_tuple("Disconnected").field(reason).finish(),
        }
    }
}

/// Process-lifetime agent state, owned by the orchestrator
#[derive(Debug)]
pub struct AgentSession {
    config: AgentConfig,
    capability: LlmCapability,
    context: Context,
    system_instructions: String,
    cache: RwLock<Option<CacheHandle>>,
}

impl AgentSession {
    /// Build a session from the environment: credential, knowledge base, cache
    pub async fn establish(config: AgentConfig) -> Self {
        let capability = LlmCapability::from_env(&config);
        Self::with_capability(config, capability).await
    }

    /// Build a session around an already-resolved capability
    pub async fn with_capability(config: AgentConfig, capability: LlmCapability) -> Self {
        let loader = KnowledgeBaseLoader::new(&config.knowledge_base_dir);
        let context = loader.load();
        let system_instructions = config.system_instruction_text();

        info!(
            knowledge_base = %loader.dir().display(),
            context_chars = context.char_len(),
            model = %config.model,
            capability = ?capability,
            "Agent session starting"
        );

        let cache = match &capability {
            LlmCapability::Connected(service) => {
                let manager = ContentCacheManager::new(CachePolicy {
                    enabled: config.caching_enabled,
                    min_chars: config.min_cache_chars,
                    ttl: config.cache_ttl,
                });
                manager
                    .ensure_cache(service.as_ref(), &context, &system_instructions, &config.model)
                    .await
            }
            LlmCapability::Disconnected(reason) => {
                warn!(%reason, "No LLM available, generation will return placeholder code");
                None
            }
        };

        Self {
            config,
            capability,
            context,
            system_instructions,
            cache: RwLock::new(cache),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn capability(&self) -> &LlmCapability {
        &self.capability
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn system_instructions(&self) -> &str {
        &self.system_instructions
    }

    /// Current cache handle, if any
    pub async fn cache_handle(&self) -> Option<CacheHandle> {
        self.cache.read().await.clone()
    }

    /// Drop the handle if it is still `remote_id`. Returns whether it was dropped.
    pub async fn invalidate_cache(&self, remote_id: &str) -> bool {
        let mut cache = self.cache.write().await;
        match cache.as_ref() {
            Some(handle) if handle.remote_id == remote_id => {
                warn!(cache = %remote_id, "Context cache no longer available, falling back to inline context");
                CACHE_EVENTS.with_label_values(&["invalidated"]).inc();
                *cache = None;
                true
            }
            _ => false,
        }
    }
}
