//! Backend for Ollama's native API.
//!
//! [`OllamaBackend`] translates [`LlmRequest`]s into `/api/generate` calls
//! (prompt-only, non-streaming). A system prompt moves the call to
//! `/api/chat`. Native structured output is sent as the `format` field,
//! which Ollama accepts either as `"json"` or a full JSON Schema object.

use super::{http_error, Backend, LlmRequest, LlmResponse};
use crate::error::Result;
use crate::RepairError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

#[derive(Debug, Clone, Default)]
pub struct OllamaBackend;

impl OllamaBackend {
    fn use_chat(request: &LlmRequest) -> bool {
        request
            .config
            .system_prompt
            .as_ref()
            .is_some_and(|s| !s.is_empty())
    }

    fn build_body(request: &LlmRequest) -> Value {
        let options = json!({
            "temperature": request.config.temperature,
            "num_predict": request.config.max_tokens,
        });

        let mut body = if Self::use_chat(request) {
            json!({
                "model": request.model,
                "messages": [
                    {"role": "system", "content": request.config.system_prompt},
                    {"role": "user", "content": request.prompt},
                ],
                "stream": false,
                "options": options,
            })
        } else {
            json!({
                "model": request.model,
                "prompt": request.prompt,
                "stream": false,
                "options": options,
            })
        };

        if let Some(ref rs) = request.response_schema {
            body["format"] = rs.schema.clone();
        } else if request.config.json_mode {
            body["format"] = json!("json");
        }
        body
    }

    fn extract_text(json_resp: &Value) -> String {
        json_resp
            .get("response")
            .or_else(|| json_resp.get("message").and_then(|m| m.get("content")))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    }

    fn extract_metadata(json_resp: &Value) -> Option<Value> {
        let mut meta = serde_json::Map::new();
        for key in ["model", "total_duration", "eval_count", "prompt_eval_count"] {
            if let Some(v) = json_resp.get(key) {
                meta.insert(key.into(), v.clone());
            }
        }
        if meta.is_empty() {
            None
        } else {
            Some(Value::Object(meta))
        }
    }
}

#[async_trait]
impl Backend for OllamaBackend {
    async fn complete(
        &self,
        client: &Client,
        base_url: &str,
        request: &LlmRequest,
    ) -> Result<LlmResponse> {
        let base = base_url.trim_end_matches('/');
        let endpoint = if Self::use_chat(request) {
            "/api/chat"
        } else {
            "/api/generate"
        };
        let url = format!("{}{}", base, endpoint);
        let body = Self::build_body(request);

        let resp = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(RepairError::Request)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(http_error(resp).await);
        }

        let json_resp: Value = resp.json().await?;
        Ok(LlmResponse {
            text: Self::extract_text(&json_resp),
            status,
            metadata: Self::extract_metadata(&json_resp),
        })
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ResponseSchema;
    use crate::config::LlmConfig;

    fn request() -> LlmRequest {
        LlmRequest {
            model: "llama3.2:3b".into(),
            prompt: "Analyze".into(),
            config: LlmConfig::default(),
            response_schema: None,
        }
    }

    #[test]
    fn test_generate_body() {
        let body = OllamaBackend::build_body(&request());
        assert_eq!(body["model"], "llama3.2:3b");
        assert_eq!(body["prompt"], "Analyze");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 2048);
        assert!(body.get("format").is_none());
        assert!(body.get("messages").is_none());
    }

    #[test]
    fn test_chat_body_with_system_prompt() {
        let mut req = request();
        req.config.system_prompt = Some("Be terse.".into());
        assert!(OllamaBackend::use_chat(&req));
        let body = OllamaBackend::build_body(&req);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Analyze");
        assert!(body.get("prompt").is_none());
    }

    #[test]
    fn test_json_mode_format() {
        let mut req = request();
        req.config.json_mode = true;
        assert_eq!(OllamaBackend::build_body(&req)["format"], "json");
    }

    #[test]
    fn test_schema_format() {
        let mut req = request();
        req.response_schema = Some(ResponseSchema {
            name: "s".into(),
            schema: json!({"type": "object", "properties": {}}),
        });
        assert_eq!(OllamaBackend::build_body(&req)["format"]["type"], "object");
    }

    #[test]
    fn test_extract_text_generate_and_chat() {
        assert_eq!(
            OllamaBackend::extract_text(&json!({"response": "{}"})),
            "{}"
        );
        assert_eq!(
            OllamaBackend::extract_text(&json!({"message": {"content": "{}"}})),
            "{}"
        );
        assert_eq!(OllamaBackend::extract_text(&json!({"done": true})), "");
    }
}
