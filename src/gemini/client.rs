//! Generative Language API client for content generation and context caching

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::types::{
    CachedContent, CreateCachedContentRequest, GenerateContentRequest, GenerateContentResponse,
    ListCachedContentsResponse,
};

/// Default REST endpoint of the Generative Language API
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Error type for remote generation and cache operations
#[derive(Debug)]
pub enum GeminiError {
    /// Transport-level failure (DNS, TLS, timeout, ...)
    Request(reqwest::Error),
    /// The service answered with a body we could not decode
    Parse(serde_json::Error),
    /// Non-success HTTP status
    Status { code: u16, body: String },
    /// The request referenced a cached content entry the service no longer has
    CacheNotFound(String),
    /// The model returned no text
    EmptyResponse,
}

impl GeminiError {
    /// Whether this error means the referenced cache handle is no longer usable
    pub fn is_cache_invalid(&self) -> bool {
        matches!(self, GeminiError::CacheNotFound(_))
    }
}

impl std::fmt::Display for GeminiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeminiError::Request(e) => write!(f, "Request error: {}", e),
            GeminiError::Parse(e) => write!(f, "Parse error: {}", e),
            GeminiError::Status { code, body } => write!(f, "HTTP {}: {}", code, body),
            GeminiError::CacheNotFound(body) => write!(f, "Cached content not found: {}", body),
            GeminiError::EmptyResponse => write!(f, "Empty response from model"),
        }
    }
}

impl std::error::Error for GeminiError {}

impl From<reqwest::Error> for GeminiError {
    fn from(e: reqwest::Error) -> Self {
        GeminiError::Request(e)
    }
}

impl From<serde_json::Error> for GeminiError {
    fn from(e: serde_json::Error) -> Self {
        GeminiError::Parse(e)
    }
}

/// The remote capability the agent consumes: text generation plus cache lifecycle.
///
/// `GeminiClient` is the production implementation; tests substitute stubs.
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Generate text for a single request and return the model's reply
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<String, GeminiError>;

    /// List every cached content entry visible to the credential
    async fn list_cached_contents(&self) -> Result<Vec<CachedContent>, GeminiError>;

    /// Create a new cached content entry
    async fn create_cached_content(
        &self,
        request: &CreateCachedContentRequest,
    ) -> Result<CachedContent, GeminiError>;
}

/// Client for the Generative Language REST API
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - API root (e.g., `DEFAULT_API_BASE`)
    /// * `api_key` - Credential sent as `x-goog-api-key`
    /// * `timeout` - Per-request timeout, applied at the transport boundary
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GeminiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Read a response body and map non-success statuses to `GeminiError::Status`
    async fn read_body(response: reqwest::Response) -> Result<String, GeminiError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GeminiError::Status {
                code: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

/// Decide whether a failed cached generation means the cache entry is gone
fn is_missing_cache(code: u16, body: &str) -> bool {
    code == StatusCode::NOT_FOUND.as_u16()
        || ((code == StatusCode::BAD_REQUEST.as_u16() || code == StatusCode::FORBIDDEN.as_u16())
            && body.contains("CachedContent"))
}

#[async_trait]
impl ContentService for GeminiClient {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<String, GeminiError> {
        let endpoint = format!(
            "{}/{}:generateContent",
            self.base_url,
            super::types::model_resource(model)
        );

        let response = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let body = match Self::read_body(response).await {
            Ok(body) => body,
            Err(GeminiError::Status { code, body })
                if request.cached_content.is_some() && is_missing_cache(code, &body) =>
            {
                return Err(GeminiError::CacheNotFound(body));
            }
            Err(e) => return Err(e),
        };

        let parsed: GenerateContentResponse = serde_json::from_str(&body)?;
        parsed.first_text().ok_or(GeminiError::EmptyResponse)
    }

    async fn list_cached_contents(&self) -> Result<Vec<CachedContent>, GeminiError> {
        let endpoint = format!("{}/cachedContents", self.base_url);
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&endpoint)
                .header("x-goog-api-key", &self.api_key);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let body = Self::read_body(request.send().await?).await?;
            let page: ListCachedContentsResponse = if body.trim().is_empty() {
                ListCachedContentsResponse::default()
            } else {
                serde_json::from_str(&body)?
            };
            entries.extend(page.cached_contents);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(entries)
    }

    async fn create_cached_content(
        &self,
        request: &CreateCachedContentRequest,
    ) -> Result<CachedContent, GeminiError> {
        let endpoint = format!("{}/cachedContents", self.base_url);
        let response = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let body = Self::read_body(response).await?;
        Ok(serde_json::from_str(&body)?)
    }
}
