//! Prompt construction for cached and inline-context generation

use crate::gemini::{Content, GenerateContentRequest, GenerationConfig};
use crate::knowledge::Context;

use super::cache::CacheHandle;

/// Output contract restated in every prompt
pub const OUTPUT_CONTRACT: &str = "INSTRUCTIONS:
1. Generate valid Python code.
2. Assume 'import yt' is needed.
3. If the request is unclear, generate code that prints a clarification message.
4. Output ONLY the code block.";

/// A fully built generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub query: String,
    /// Text sent as the user turn
    pub prompt: String,
    pub use_cache: bool,
    pub cache_handle: Option<CacheHandle>,
    pub temperature: f32,
}

impl GenerationRequest {
    /// Wire form for `generateContent`
    pub fn to_wire(&self) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(self.prompt.clone())],
            system_instruction: None,
            cached_content: self.cache_handle.as_ref().map(|h| h.remote_id.clone()),
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

/// Builds model-facing requests.
///
/// With a cache handle the prompt carries only the query and the output
/// contract; the cache supplies the documentation and system instructions.
/// Without one, everything is inlined.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    temperature: f32,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self { temperature: 0.2 }
    }
}

impl PromptBuilder {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }

    pub fn build(
        &self,
        query: &str,
        context: &Context,
        system_instructions: &str,
        cache_handle: Option<&CacheHandle>,
    ) -> GenerationRequest {
        let prompt = match cache_handle {
            Some(_) => format!("USER REQUEST:\n{}\n\n{}\n", query, OUTPUT_CONTRACT),
            None => format!(
                "{}\n\nUse the following documentation context to answer the user's request.\nCONTEXT:\n{}\n\nUSER REQUEST:\n{}\n\n{}\n",
                system_instructions, context, query, OUTPUT_CONTRACT
            ),
        };

        GenerationRequest {
            query: query.to_string(),
            prompt,
            use_cache: cache_handle.is_some(),
            cache_handle: cache_handle.cloned(),
            temperature: self.temperature,
        }
    }
}
