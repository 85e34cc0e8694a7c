//! Generative Language API integration
//!
//! This module provides the remote capability the agent is built on:
//! `generateContent` for code generation and the `cachedContents`
//! lifecycle used to keep the knowledge base server-side.

pub mod client;
pub mod types;

pub use client::{ContentService, GeminiClient, GeminiError, DEFAULT_API_BASE};
pub use types::{
    CachedContent, Content, CreateCachedContentRequest, GenerateContentRequest, GenerationConfig,
    Part,
};
