//! Server-side context cache management
//!
//! The knowledge base is large and identical across requests, so it is
//! uploaded once as a cached content entry and referenced by name. Cache
//! identity is the SHA-256 of the context text, carried in the entry's
//! display name, so every process with the same knowledge base finds and
//! reuses the same entry.
//!
//! ```text
//! ensure_cache(context)
//!   ├─ disabled or empty context ──────────────► None
//!   ├─ list entries, match display name ───────► reuse
//!   ├─ context < min_chars ────────────────────► None (skip)
//!   └─ create entry (ttl, system instruction) ─► new handle
//!   any remote failure ────────────────────────► None (inline mode)
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::gemini::types::model_resource;
use crate::gemini::{CachedContent, Content, ContentService, CreateCachedContentRequest};
use crate::knowledge::Context;
use crate::metrics::CACHE_EVENTS;

/// Prefix of every cache entry display name created by the agent
pub const DISPLAY_NAME_PREFIX: &str = "yt-agent-kb-";

/// Deterministic digest of a context, used as the cache identity key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of(context: &Context) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(context.as_str().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Display name of the cache entry holding this context
    pub fn display_name(&self) -> String {
        format!("{}{}", DISPLAY_NAME_PREFIX, self.0)
    }
}

/// Reference to a server-side cached copy of the context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHandle {
    pub display_name: String,
    /// Resource name used in generation requests (`cachedContents/...`)
    pub remote_id: String,
    /// Remaining lifetime when the handle was obtained
    pub ttl: Duration,
}

/// Caching rules
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub enabled: bool,
    /// Minimum context length, in characters, worth caching
    pub min_chars: usize,
    pub ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_chars: 1000,
            ttl: Duration::from_secs(7200),
        }
    }
}

/// Decides whether a remote cache entry is reused, created, or skipped
#[derive(Debug, Clone, Default)]
pub struct ContentCacheManager {
    policy: CachePolicy,
}

impl ContentCacheManager {
    pub fn new(policy: CachePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Return a handle to a live cache entry holding `context`, if caching applies.
    ///
    /// Never fails: listing or creation errors are logged and yield `None`,
    /// which sends the caller down the inline-context path.
    pub async fn ensure_cache(
        &self,
        service: &dyn ContentService,
        context: &Context,
        system_instructions: &str,
        model: &str,
    ) -> Option<CacheHandle> {
        if !self.policy.enabled || context.is_empty() {
            debug!(enabled = self.policy.enabled, "Context caching not applicable");
            return None;
        }

        let hash = ContentHash::of(context);
        let display_name = hash.display_name();
        let model_name = model_resource(model);

        let entries = match service.list_cached_contents().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to list cached contents, using inline context");
                CACHE_EVENTS.with_label_values(&["failed"]).inc();
                return None;
            }
        };

        let now = Utc::now();
        if let Some(entry) = entries
            .iter()
            .find(|entry| is_reusable(entry, &display_name, &model_name, now))
        {
            info!(cache = %entry.name, display_name = %display_name, "Reusing context cache");
            CACHE_EVENTS.with_label_values(&["reused"]).inc();
            return Some(CacheHandle {
                display_name,
                remote_id: entry.name.clone(),
                ttl: remaining_ttl(entry, now).unwrap_or(self.policy.ttl),
            });
        }

        let length = context.char_len();
        if length < self.policy.min_chars {
            debug!(length, min_chars = self.policy.min_chars, "Context too short to cache");
            CACHE_EVENTS.with_label_values(&["skipped"]).inc();
            return None;
        }

        let request = CreateCachedContentRequest {
            model: model_name,
            display_name: display_name.clone(),
            system_instruction: Content::instruction(system_instructions),
            contents: vec![Content::user(context.as_str())],
            ttl: format!("{}s", self.policy.ttl.as_secs()),
        };

        match service.create_cached_content(&request).await {
            Ok(entry) => {
                info!(cache = %entry.name, length, ttl_secs = self.policy.ttl.as_secs(), "Created context cache");
                CACHE_EVENTS.with_label_values(&["created"]).inc();
                Some(CacheHandle {
                    display_name,
                    remote_id: entry.name,
                    ttl: self.policy.ttl,
                })
            }
            Err(e) => {
                warn!(error = %e, "Failed to create context cache, using inline context");
                CACHE_EVENTS.with_label_values(&["failed"]).inc();
                None
            }
        }
    }
}

fn expiry(entry: &CachedContent) -> Option<DateTime<Utc>> {
    entry
        .expire_time
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Lifetime left on an entry, when its expiry is known
fn remaining_ttl(entry: &CachedContent, now: DateTime<Utc>) -> Option<Duration> {
    expiry(entry).and_then(|t| (t - now).to_std().ok())
}

/// Same context, same model (when reported), not yet expired
fn is_reusable(entry: &CachedContent, display_name: &str, model: &str, now: DateTime<Utc>) -> bool {
    entry.display_name == display_name
        && (entry.model.is_empty() || entry.model == model)
        && expiry(entry).map(|t| t > now).unwrap_or(true)
}
