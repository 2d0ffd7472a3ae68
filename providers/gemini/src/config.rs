//! Configuration for the Gemini embedding and LLM provider.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub api_base: String,
    pub max_tokens: Option<u32>,
    pub timeout_ms: u64,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gemini-1.5-pro".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            embedding_dimensions: 768,
            api_base: "https://generativelanguage.googleapis.com/v1".to_string(),
            max_tokens: Some(4096),
            timeout_ms: 30_000,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.embedding_model = model.into();
        self.embedding_dimensions = dimensions;
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self::new("")
    }
}
