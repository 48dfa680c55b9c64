//! Generation settings sent with every request.

/// Configuration for LLM requests.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f64,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Optional system prompt sent ahead of every user prompt.
    pub system_prompt: Option<String>,

    /// Ask the provider for a JSON object (`response_format: json_object`,
    /// Ollama `format: "json"`).
    pub json_mode: bool,

    /// Send the target schema to the provider so it constrains decoding
    /// (native structured output). Takes precedence over `json_mode`.
    /// Output is still validated locally.
    pub native_schema: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            system_prompt: None,
            json_mode: false,
            native_schema: false,
        }
    }
}

impl LlmConfig {
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    pub fn with_native_schema(mut self, enabled: bool) -> Self {
        self.native_schema = enabled;
        self
    }
}
