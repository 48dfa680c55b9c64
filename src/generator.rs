//! The generator: one prompt in, raw text out.
//!
//! [`Generator`] carries the HTTP client, provider backend, endpoint and
//! generation settings. It is stateless across calls, cheap to share behind
//! an `Arc`, and never retries: an empty completion becomes
//! [`RepairError::EmptyResponse`], anything that goes wrong on the wire is
//! returned as-is.

use crate::backend::{Backend, LlmRequest, OpenAiBackend, OllamaBackend, ResponseSchema};
use crate::config::LlmConfig;
use crate::error::{RepairError, Result};
use crate::schema::Schema;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Stateless wrapper around a remote completion service.
///
/// # Example
///
/// ```
/// use llm_repair_loop::{Generator, LlmConfig};
///
/// let generator = Generator::builder("https://api.openai.com/v1")
///     .openai_with_key("sk-...")
///     .config(LlmConfig::default().with_json_mode(true))
///     .build()
///     .unwrap();
/// assert_eq!(generator.base_url(), "https://api.openai.com");
/// ```
pub struct Generator {
    client: Client,
    base_url: String,
    backend: Arc<dyn Backend>,
    config: LlmConfig,
}

impl Generator {
    /// Create a new builder.
    pub fn builder(base_url: impl Into<String>) -> GeneratorBuilder {
        GeneratorBuilder {
            client: None,
            base_url: base_url.into(),
            backend: None,
            config: LlmConfig::default(),
            timeout: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Send `prompt` to `model_id` and return the raw completion text.
    pub async fn complete(&self, prompt: &str, model_id: &str) -> Result<String> {
        self.complete_for(prompt, model_id, None).await
    }

    /// Like [`complete`](Self::complete), additionally handing `schema` to the
    /// provider when native structured output is enabled in the config.
    pub async fn complete_for(
        &self,
        prompt: &str,
        model_id: &str,
        schema: Option<&Schema>,
    ) -> Result<String> {
        let response_schema = schema
            .filter(|_| self.config.native_schema)
            .map(|s| ResponseSchema {
                name: s.name().to_string(),
                schema: s.to_json_schema(),
            });

        let request = LlmRequest {
            model: model_id.to_string(),
            prompt: prompt.to_string(),
            config: self.config.clone(),
            response_schema,
        };

        debug!(
            backend = self.backend.name(),
            model = model_id,
            prompt_len = prompt.len(),
            native_schema = request.response_schema.is_some(),
            "calling generator"
        );

        let response = self
            .backend
            .complete(&self.client, &self.base_url, &request)
            .await?;

        if response.text.trim().is_empty() {
            debug!(status = response.status, metadata = ?response.metadata, "generator returned no content");
            return Err(RepairError::EmptyResponse);
        }
        Ok(response.text)
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("base_url", &self.base_url)
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`Generator`].
pub struct GeneratorBuilder {
    client: Option<Client>,
    base_url: String,
    backend: Option<Arc<dyn Backend>>,
    config: LlmConfig,
    timeout: Option<Duration>,
}

impl GeneratorBuilder {
    /// Set the HTTP client. If not set, a default client is created.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the backend. Default: [`OpenAiBackend`] without authentication.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use the OpenAI-compatible backend with API key authentication.
    pub fn openai_with_key(mut self, api_key: impl Into<String>) -> Self {
        self.backend = Some(Arc::new(OpenAiBackend::new().with_api_key(api_key)));
        self
    }

    /// Use Ollama's native API.
    pub fn ollama(mut self) -> Self {
        self.backend = Some(Arc::new(OllamaBackend));
        self
    }

    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the HTTP request timeout. Default: 60 seconds.
    ///
    /// Ignored when a custom `Client` is provided via `.client()`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Generator> {
        if self.base_url.trim().is_empty() {
            return Err(RepairError::InvalidConfig("base URL must not be empty".into()));
        }
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout.unwrap_or(Duration::from_secs(60)))
                .build()?,
        };
        Ok(Generator {
            client,
            base_url: normalize_base_url(&self.base_url),
            backend: self
                .backend
                .unwrap_or_else(|| Arc::new(OpenAiBackend::new())),
            config: self.config,
        })
    }
}

/// Strip known provider path suffixes from a base URL so backends can
/// append their own paths.
/// e.g., "https://api.openai.com/v1" -> "https://api.openai.com"
/// e.g., "http://localhost:11434/api" -> "http://localhost:11434"
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    // longest first
    for suffix in &[
        "/v1/chat/completions",
        "/v1/chat",
        "/v1",
        "/api/generate",
        "/api/chat",
        "/api",
    ] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}
