//! Gemini-backed `EmbeddingProvider` and `LLMProvider`.

use akasha_core::errors::{EmbeddingFailure, LLMFailure};
use akasha_core::traits::{EmbeddingProvider, LLMProvider};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

mod config;
mod models;

pub use config::GeminiConfig;
use models::*;

pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, EmbeddingFailure> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EmbeddingFailure::reason(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{}:{}?key={}",
            self.config.api_base, model, method, self.config.api_key
        )
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn dimensions(&self) -> usize {
        self.config.embedding_dimensions
    }

    fn provider(&self) -> &str {
        "gemini"
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
        let model_path = format!("models/{}", self.config.embedding_model);
        let request = BatchEmbedContentsRequest {
            requests: texts
                .iter()
                .map(|t| EmbedContentRequest {
                    model: model_path.clone(),
                    content: Content::new_user(t.clone()),
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.endpoint(&self.config.embedding_model, "batchEmbedContents"))
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingFailure::reason(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(EmbeddingFailure::reason(format!("gemini error {}: {}", status, detail)));
        }

        let parsed: BatchEmbedContentsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingFailure::reason(format!("failed to parse response: {}", e)))?;

        if parsed.embeddings.len() != texts.len() {
            warn!(
                expected = texts.len(),
                got = parsed.embeddings.len(),
                "gemini batchEmbedContents item count mismatch"
            );
        }
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    fn provider(&self) -> &str {
        "gemini"
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

        let request = GenerateContentRequest {
            contents: vec![Content::new_user(user_content)],
            system_instruction: system_prompt.map(Content::system),
            generation_config: Some(GenerationConfig {
                temperature: Some(temperature),
                max_output_tokens: self.config.max_tokens,
            }),
        };

        debug!(model = %self.config.model, "calling Gemini generateContent");
        let response = self
            .client
            .post(self.endpoint(&self.config.model, "generateContent"))
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMFailure::reason(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LLMFailure::reason(format!("gemini error {}: {}", status, detail)));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| LLMFailure::reason(format!("failed to parse response: {}", e)))?;

        let text = parsed
            .candidates
            .into_iter()
            .flat_map(|c| c.content.parts)
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return Err(LLMFailure::reason("no content in gemini response"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base: &str) -> GeminiProvider {
        GeminiProvider::new(GeminiConfig::new("test-key").with_api_base(base)).unwrap()
    }

    #[tokio::test]
    async fn generate_joins_response_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r".*:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{"content": {"parts": [{"text": "Paris"}, {"text": "is the capital."}]}}]
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let answer = p.generate("capital of France?", "", None, 0.3).await.unwrap();
        assert_eq!(answer, "Paris\nis the capital.");
    }

    #[tokio::test]
    async fn embed_batch_returns_one_vector_per_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r".*:batchEmbedContents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [{"values": [0.1, 0.1]}, {"values": [0.2, 0.2]}]
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let out = p
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], vec![0.1, 0.1]);
    }

    #[tokio::test]
    async fn generate_errors_on_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r".*:generateContent"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "invalid request"}
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri());
        let err = p.generate("hi", "", None, 0.3).await.unwrap_err();
        assert!(err.to_string().contains("invalid request"));
    }
}
