//! Provider configuration types
//!
//! Endpoints for the chat completion backend and the embedding service.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_secret() -> SecretString {
    SecretString::from(String::new())
}

/// Chat completion backend (any OpenAI-compatible API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key
    #[serde(skip_serializing, default = "default_secret")]
    pub api_key: SecretString,
    /// Base URL, without `/chat/completions`
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,
    /// Request timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Retries after the first attempt for 429, 5xx and transport errors
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            api_key: default_secret(),
            base_url: default_base_url(),
            model: default_model(),
            timeout: default_timeout(),
            max_retries: default_retries(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_retries() -> u32 {
    3
}

/// Embedding service (OpenAI-compatible `/embeddings`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL; retrieval is disabled without one
    #[serde(default)]
    pub base_url: Option<String>,
    /// API key
    #[serde(skip_serializing, default = "default_secret")]
    pub api_key: SecretString,
    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Request timeout
    #[serde(default = "default_embedding_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            base_url: None,
            api_key: default_secret(),
            model: default_embedding_model(),
            timeout: default_embedding_timeout(),
        }
    }
}

fn default_embedding_model() -> String {
    "BAAI/bge-m3".to_string()
}

fn default_embedding_timeout() -> Duration {
    Duration::from_secs(30)
}
