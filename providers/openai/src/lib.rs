//! OpenAI-backed `EmbeddingProvider` and `LLMProvider`.

use akasha_core::errors::{EmbeddingFailure, LLMFailure};
use akasha_core::traits::{EmbeddingProvider, LLMProvider};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

mod config;
mod models;

pub use config::OpenAiConfig;
use models::*;

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, EmbeddingFailure> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EmbeddingFailure::reason(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn chat(
        &self,
        system_prompt: Option<&str>,
        user_content: String,
        temperature: f32,
    ) -> Result<String, LLMFailure> {
        let mut messages = Vec::new();
        if let Some(sp) = system_prompt {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: sp.to_string(),
            });
        }
        messages.push(OpenAiMessage {
            role: "user".to_string(),
            content: user_content,
        });

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: Some(temperature),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMFailure::reason(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<OpenAiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LLMFailure::reason(format!("openai error {}: {}", status, detail)));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LLMFailure::reason(format!("failed to parse response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LLMFailure::reason("no content in openai response"))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn dimensions(&self) -> usize {
        self.config.embedding_dimensions
    }

    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.embedding_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingFailure> {
        Ok(self.embed_batch(std::slice::from_ref(&text.to_string())).await?.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingFailure> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest {
            model: self.config.embedding_model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.api_base))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingFailure::reason(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<OpenAiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(EmbeddingFailure::reason(format!("openai error {}: {}", status, detail)));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingFailure::reason(format!("failed to parse response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            warn!(
                expected = texts.len(),
                got = parsed.data.len(),
                "openai embeddings response item count mismatch"
            );
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl LLMProvider for OpenAiProvider {
    fn provider(&self) -> &str {
        "openai"
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
        debug!(model = %self.config.model, "calling OpenAI chat completions");
        self.chat(system_prompt, user_content, temperature).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base: &str) -> OpenAiProvider {
        OpenAiProvider::new(OpenAiConfig::new("test-key").with_api_base(base)).unwrap()
    }

    #[tokio::test]
    async fn generate_sends_system_and_user_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "Paris is the capital of France."}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5}
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let answer = p
            .generate("What is the capital of France?", "France is a country in Europe.", Some("Answer tersely."), 0.7)
            .await
            .unwrap();
        assert_eq!(answer, "Paris is the capital of France.");
    }

    #[tokio::test]
    async fn embed_batch_preserves_order_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"embedding": [0.2, 0.2], "index": 1},
                    {"embedding": [0.1, 0.1], "index": 0}
                ]
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let out = p
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(out[0], vec![0.1, 0.1]);
        assert_eq!(out[1], vec![0.2, 0.2]);
    }

    #[tokio::test]
    async fn api_error_surfaces_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "invalid api key"}
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let err = p.generate("hi", "", None, 0.5).await.unwrap_err();
        assert!(err.to_string().contains("invalid api key"));
    }
}
