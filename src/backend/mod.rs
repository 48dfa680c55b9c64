//! Backend trait and normalized request/response types.
//!
//! The [`Backend`] trait abstracts over LLM providers, translating between
//! normalized [`LlmRequest`]/[`LlmResponse`] types and provider-specific
//! HTTP APIs. Built-in implementations: [`OpenAiBackend`], [`OllamaBackend`],
//! and the scripted [`MockBackend`] for tests.
//!
//! ## Architecture
//!
//! ```text
//! RetryController ──► Generator::complete() ──► LlmRequest ──► Backend::complete() ──► LlmResponse
//!                                                                   │
//!                                                        ┌──────────┴──────────┐
//!                                                   OpenAiBackend         OllamaBackend
//!                                               /v1/chat/completions      /api/generate
//! ```
//!
//! Backends never retry. A non-success status becomes
//! [`RepairError::HttpError`](crate::RepairError::HttpError); whether to run
//! the loop again is the caller's decision (see [`crate::backoff`]).

pub mod mock;
pub mod ollama;
pub mod openai;

pub use mock::{MockBackend, MockReply};
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use crate::config::LlmConfig;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// A normalized LLM request — provider-agnostic.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Model identifier (e.g. `"gpt-4o"`, `"llama3.2:3b"`).
    pub model: String,

    /// The complete prompt for this attempt. Repair prompts replace,
    /// never append to, the previous prompt.
    pub prompt: String,

    /// Generation settings.
    pub config: LlmConfig,

    /// Target schema for providers with native structured output.
    /// Only set when [`LlmConfig::native_schema`] is enabled.
    pub response_schema: Option<ResponseSchema>,
}

/// A JSON Schema handed to the provider to constrain decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    /// Schema name (OpenAI requires `^[a-zA-Z0-9_-]+$`).
    pub name: String,
    /// The JSON Schema document.
    pub schema: Value,
}

/// A normalized LLM response.
#[derive(Debug)]
pub struct LlmResponse {
    /// The generated text content. Empty when the provider sent none.
    pub text: String,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Provider-specific metadata (token counts, model info, refusals).
    pub metadata: Option<Value>,
}

/// Abstraction over LLM providers.
///
/// Implementors translate between the normalized [`LlmRequest`]/[`LlmResponse`]
/// and the provider's HTTP API.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Backend>`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute a non-streaming completion.
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Parse a `Retry-After` header value as whole seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Turn a non-success HTTP response into [`RepairError::HttpError`](crate::RepairError::HttpError).
pub(crate) async fn http_error(resp: reqwest::Response) -> crate::RepairError {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    let body = resp.text().await.unwrap_or_default();
    crate::RepairError::HttpError {
        status,
        body,
        retry_after,
    }
}
