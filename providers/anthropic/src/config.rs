//! Configuration for the Anthropic LLM provider.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub timeout_ms: u64,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            api_base: "https://api.anthropic.com".to_string(),
            max_tokens: 4096,
            temperature: Some(0.1),
            timeout_ms: 30_000,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self::new("")
    }
}
