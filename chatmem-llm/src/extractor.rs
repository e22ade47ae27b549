//! [`ExtractionAdapter`] backed by an [`LlmClient`].

use async_trait::async_trait;
use chatmem_core::config::LlmConfig;
use chatmem_core::extraction::{ExtractionAdapter, ExtractionError, ExtractionRequest};
use tracing::debug;

use crate::client::LlmClient;
use crate::error::LlmError;
use crate::prompt;
use crate::types::LlmRequest;

/// Turns extraction requests into LLM calls and returns the raw reply.
#[derive(Debug, Clone)]
pub struct LlmExtractor {
    client: LlmClient,
    max_tokens: u32,
    temperature: f32,
    timeout_ms: u64,
    json_mode: bool,
}

impl LlmExtractor {
    /// Wrap an existing client, taking sampling limits and JSON mode from
    /// `config`.
    #[must_use]
    pub fn new(client: LlmClient, config: &LlmConfig) -> Self {
        Self {
            client,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout_ms: config.request_timeout_ms,
            json_mode: config.json_mode,
        }
    }

    /// Build the client and extractor from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ConfigError`] for an unknown provider name.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self::new(LlmClient::from_config(config)?, config))
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &LlmClient {
        &self.client
    }

    /// The LLM request sent for `request`.
    #[must_use]
    pub fn build_request(&self, request: &ExtractionRequest) -> LlmRequest {
        let (system, user) = prompt::extraction_prompts(&request.character, &request.input);
        LlmRequest::new(system, user)
            .with_sampling(self.max_tokens, self.temperature)
            .with_json_mode(self.json_mode)
            .with_timeout(self.timeout_ms)
    }
}

#[async_trait]
impl ExtractionAdapter for LlmExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<String, ExtractionError> {
        let llm_request = self.build_request(request);
        let response = self.client.generate(&llm_request).await?;
        debug!(
            subject = %request.subject,
            model = %response.model,
            latency_ms = response.latency_ms,
            "Extraction reply received"
        );
        Ok(response.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatmem_core::extraction::{CharacterContext, ExtractionInput};
    use chatmem_core::SubjectId;

    fn request() -> ExtractionRequest {
        ExtractionRequest {
            subject: SubjectId::new("kai"),
            character: CharacterContext::new("Kai", "laid-back barista"),
            input: ExtractionInput::Onboarding {
                description: "{{user}} is a regular at Kai's cafe.".into(),
            },
        }
    }

    #[test]
    fn request_uses_configured_sampling() {
        let config = LlmConfig {
            max_tokens: 256,
            temperature: 0.1,
            request_timeout_ms: 1_500,
            ..LlmConfig::default()
        };
        let extractor = LlmExtractor::new(LlmClient::none(), &config);
        let llm_request = extractor.build_request(&request());
        assert_eq!(llm_request.max_tokens, 256);
        assert_eq!(llm_request.timeout_ms, 1_500);
        assert!(llm_request.user.contains("regular at Kai's cafe"));
        assert!(!llm_request.json_mode);
    }

    #[test]
    fn json_mode_follows_config() {
        let config = LlmConfig {
            json_mode: true,
            ..LlmConfig::default()
        };
        let extractor = LlmExtractor::new(LlmClient::none(), &config);
        assert!(extractor.build_request(&request()).json_mode);
    }

    #[tokio::test]
    async fn missing_backend_is_unavailable() {
        let config = LlmConfig {
            provider: "none".into(),
            ..LlmConfig::default()
        };
        let extractor = LlmExtractor::from_config(&config).expect("config");
        let result = extractor.extract(&request()).await;
        assert!(matches!(result, Err(ExtractionError::Unavailable(_))));
    }
}
