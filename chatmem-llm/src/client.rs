//! LLM Client — unified interface for Ollama and OpenAI-compatible backends.

use std::time::{Duration, Instant};

use chatmem_core::config::LlmConfig;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse};

/// Provider backend for LLM inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    /// Ollama running locally (recommended).
    Ollama {
        /// Server root, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible chat completions API.
    OpenAiCompatible {
        /// API root without the `/v1` suffix.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No LLM available — all calls fail and extraction contributes nothing.
    None,
}

impl LlmProvider {
    /// Resolve the provider named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] for an unknown provider name.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        match config.provider.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama { base_url }),
            "openai" | "openai_compatible" | "openai-compatible" => Ok(Self::OpenAiCompatible {
                base_url,
                api_key: config.api_key.clone(),
            }),
            "none" | "" => Ok(Self::None),
            other => Err(LlmError::ConfigError(format!("unknown LLM provider '{other}'"))),
        }
    }
}

/// The main LLM client that routes requests to the configured backend.
#[derive(Debug, Clone)]
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
}

impl LlmClient {
    /// Create a new LLM client.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
        }
    }

    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] for an unknown provider name.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider = LlmProvider::from_config(config)?;
        Ok(Self::new(provider, config.model.clone(), config.max_retries))
    }

    /// Create a client with no LLM backend (all calls fail).
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), 0)
    }

    /// The configured provider.
    #[must_use]
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// The model name sent with every request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check if the LLM client has a backend configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    /// Generate a response from the LLM.
    ///
    /// # Errors
    ///
    /// Returns `Err` if no provider is configured or all retries fail.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => {
                let url = format!("{base_url}/api/generate");
                let body = ollama_body(&self.model, request);
                self.post_with_retries(&url, None, &body, request.timeout_ms, ollama_text)
                    .await
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let url = format!("{base_url}/v1/chat/completions");
                let body = openai_body(&self.model, request);
                self.post_with_retries(&url, Some(api_key), &body, request.timeout_ms, openai_text)
                    .await
            }
        }
    }

    async fn post_with_retries(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &Value,
        timeout_ms: u64,
        extract: fn(&Value) -> (String, u32),
    ) -> Result<LlmResponse, LlmError> {
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("Retrying LLM call (attempt {}/{})", attempt + 1, self.max_retries + 1);
            }

            let start = Instant::now();
            let mut builder = self
                .http
                .post(url)
                .json(body)
                .timeout(Duration::from_millis(timeout_ms));
            if let Some(key) = bearer.filter(|k| !k.is_empty()) {
                builder = builder.bearer_auth(key);
            }
            let result = builder.send().await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let (text, tokens_generated) = extract(&json);
                    debug!(latency_ms, tokens_generated, model = %self.model, "LLM call complete");
                    return Ok(LlmResponse {
                        text,
                        tokens_generated,
                        latency_ms,
                        model: self.model.clone(),
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    last_error = format!("HTTP {status}: {}", resp.text().await.unwrap_or_default());
                    warn!("LLM backend returned error: {last_error}");
                }
                Err(e) if e.is_connect() => {
                    warn!("LLM backend unreachable: {e}");
                    return Err(LlmError::Unavailable(e.to_string()));
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!("LLM request timed out after {timeout_ms}ms");
                    } else {
                        warn!("LLM request failed: {last_error}");
                    }
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

/// Request body for Ollama's `/api/generate`.
fn ollama_body(model: &str, request: &LlmRequest) -> Value {
    let mut body = json!({
        "model": model,
        "system": request.system,
        "prompt": request.user,
        "stream": false,
        "options": {
            "temperature": request.temperature,
            "num_predict": request.max_tokens,
        }
    });
    if request.json_mode {
        body["format"] = json!("json");
    }
    body
}

/// Request body for `/v1/chat/completions`.
fn openai_body(model: &str, request: &LlmRequest) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [
            { "role": "system", "content": request.system },
            { "role": "user", "content": request.user },
        ],
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    });
    if request.json_mode {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

fn token_count(value: &Value) -> u32 {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

fn ollama_text(json: &Value) -> (String, u32) {
    let text = json["response"].as_str().unwrap_or_default().to_string();
    (text, token_count(&json["eval_count"]))
}

fn openai_text(json: &Value) -> (String, u32) {
    let text = json["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    (text, token_count(&json["usage"]["completion_tokens"]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_from_config() {
        let mut config = LlmConfig::default();
        assert_eq!(
            LlmProvider::from_config(&config).expect("ollama"),
            LlmProvider::Ollama {
                base_url: "http://localhost:11434".into()
            }
        );

        config.provider = "OpenAI".into();
        config.base_url = "https://api.example.com/".into();
        config.api_key = "sk-test".into();
        assert_eq!(
            LlmProvider::from_config(&config).expect("openai"),
            LlmProvider::OpenAiCompatible {
                base_url: "https://api.example.com".into(),
                api_key: "sk-test".into()
            }
        );

        config.provider = "carrier-pigeon".into();
        assert!(matches!(
            LlmProvider::from_config(&config),
            Err(LlmError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn none_provider_is_unavailable() {
        let client = LlmClient::none();
        assert!(!client.is_available());
        let result = client.generate(&LlmRequest::new("sys", "user")).await;
        assert!(matches!(result, Err(LlmError::Unavailable(_))));
    }

    #[test]
    fn bodies_carry_prompts_and_json_mode() {
        let request = LlmRequest::new("be terse", "hello").with_json_mode(true);

        let ollama = ollama_body("qwen", &request);
        assert_eq!(ollama["system"], "be terse");
        assert_eq!(ollama["prompt"], "hello");
        assert_eq!(ollama["format"], "json");

        let openai = openai_body("gpt", &request);
        assert_eq!(openai["messages"][1]["content"], "hello");
        assert_eq!(openai["response_format"]["type"], "json_object");

        let plain = ollama_body("qwen", &request.clone().with_json_mode(false));
        assert!(plain.get("format").is_none());
    }

    #[test]
    fn reply_text_is_extracted() {
        let ollama = json!({ "response": "[]", "eval_count": 3 });
        assert_eq!(ollama_text(&ollama), ("[]".to_string(), 3));

        let openai = json!({
            "choices": [{ "message": { "content": "{\"memories\": []}" } }],
            "usage": { "completion_tokens": 7 }
        });
        assert_eq!(openai_text(&openai), ("{\"memories\": []}".to_string(), 7));
        assert_eq!(openai_text(&json!({})), (String::new(), 0));
    }
}
