//! LLM provider abstraction.
//!
//! The pipeline's decomposer and verifier talk to an LLM backend only
//! through [`LlmProvider`]. Backends are independent variants selected at
//! startup from explicit configuration; there is no runtime registry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{env_duration, env_string};

mod ollama;

pub use ollama::OllamaProvider;

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider unreachable: {0}")]
    Connection(String),

    #[error("provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("unparseable provider response: {0}")]
    Parse(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Transient failures get a single retry with backoff before being
    /// reclassified into the calling stage's error.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Connection(_) | ProviderError::Timeout(_))
    }
}

/// Configuration for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 for deterministic fact-checking)
    pub temperature: f32,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    /// Model used
    pub model: String,
}

/// Capability interface for LLM backends.
///
/// Every call into an implementation is a suspension point and must
/// honor the timeout in [`CompletionConfig`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if the backend is reachable and ready.
    async fn health_check(&self) -> bool;

    /// Provider name for logs and metrics.
    fn name(&self) -> &str;
}

/// Which backend to use, chosen once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderKind {
    Ollama { base_url: String },
}

/// Provider selection plus completion defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Backend variant
    pub backend: ProviderKind,

    /// Model name passed to the backend
    pub model: String,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Backoff before the single retry of a transient failure
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            backend: ProviderKind::Ollama {
                base_url: "http://localhost:11434".to_string(),
            },
            model: "llama3.2".to_string(),
            timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl ProviderSettings {
    /// Load provider selection from the environment.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            backend: ProviderKind::Ollama {
                base_url: env_string("ATTEST_OLLAMA_URL", "http://localhost:11434"),
            },
            model: env_string("ATTEST_MODEL", &d.model),
            timeout: env_duration("ATTEST_PROVIDER_TIMEOUT", d.timeout),
            retry_backoff: env_duration("ATTEST_RETRY_BACKOFF", d.retry_backoff),
        }
    }

    /// Instantiate the configured backend.
    pub fn build(&self) -> Arc<dyn LlmProvider> {
        match &self.backend {
            ProviderKind::Ollama { base_url } => Arc::new(OllamaProvider::new(base_url.clone())),
        }
    }

    /// Completion defaults derived from these settings.
    pub fn completion_config(&self, max_tokens: u32) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens,
            temperature: 0.0,
            timeout: self.timeout,
        }
    }
}
