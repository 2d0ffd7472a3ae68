//! Anthropic-backed `LLMProvider`.

use akasha_core::errors::LLMFailure;
use akasha_core::traits::LLMProvider;
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

mod config;
mod models;

pub use config::AnthropicConfig;
use models::*;

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self, LLMFailure> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| LLMFailure::reason(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &str,
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<String, LLMFailure> {
        let user_content = if context.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n\n{}", prompt, context)
        };

        let request = MessageRequest {
            model: self.config.model.clone(),
            messages: vec![Message::new_user(user_content)],
            system: system_prompt.map(str::to_string),
            max_tokens: self.config.max_tokens,
            temperature: Some(temperature),
        };

        debug!(model = %self.config.model, "calling Anthropic messages API");
        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.api_base))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMFailure::reason(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LLMFailure::reason(format!("anthropic error {}: {}", status, detail)));
        }

        let parsed: MessageResponse = response
            .json()
            .await
            .map_err(|e| LLMFailure::reason(format!("failed to parse response: {}", e)))?;

        let text = parsed
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return Err(LLMFailure::reason("no text content in anthropic response"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base: &str) -> AnthropicProvider {
        AnthropicProvider::new(AnthropicConfig::new("test-key").with_api_base(base)).unwrap()
    }

    #[tokio::test]
    async fn generate_joins_multiple_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    {"type": "text", "text": "Paris"},
                    {"type": "text", "text": "is the capital."}
                ],
                "usage": {"input_tokens": 12, "output_tokens": 4}
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let answer = p.generate("capital of France?", "", None, 0.3).await.unwrap();
        assert_eq!(answer, "Paris\nis the capital.");
    }

    #[tokio::test]
    async fn generate_errors_on_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"type": "rate_limit_error", "message": "rate limited"}
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let err = p.generate("hi", "", None, 0.3).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }
}
