//! Pluggable LLM backend abstraction
//!
//! This module provides a backend-agnostic interface for the two LLM calls the
//! pipeline makes: free-form chat and JSON generation. Local servers only
//! (Ollama, OpenAI-compatible servers), plus a scriptable mock.
//!
//! # Architecture
//!
//! - `LlmBackend` trait: defines the interface for all backends
//! - `LlmClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OllamaBackend`, `OpenAICompatibleBackend`, `MockBackend`
//! - `parsing`: the single deserialization boundary for model output
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (ollama, openai_compatible, mock). Default: ollama
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: Default model name (default: llama3.2)
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required for openai_compatible backend)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-3.5-turbo)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

mod http;
mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use mock::{MockBackend, MockRequest, MockRequestKind};
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use async_trait::async_trait;

use crate::error::Result;

/// Trait defining the interface for all LLM backends
///
/// Errors are typed: `Auth`, `RateLimited`, `Timeout`, `Unavailable` for the
/// upstream family and `MalformedResponse` for empty or unusable output.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Free-form chat completion
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String>;

    /// Completion constrained to JSON output
    ///
    /// The text is meant to be parseable JSON but may still arrive inside
    /// markdown fences; callers go through `parsing`.
    async fn generate_json(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &ChatOptions,
    ) -> Result<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Get the model name
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;

    /// Get router configuration info
    fn router_info(&self) -> RouterInfo;
}

/// Concrete LLM client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum LlmClient {
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// OpenAI-compatible backend (vLLM, LocalAI, llama-server, etc.)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl LlmClient {
    /// Create a client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `ollama` (default): Uses OLLAMA_HOST and OLLAMA_MODEL
    /// - `openai_compatible`: Uses OPENAI_COMPATIBLE_HOST and OPENAI_COMPATIBLE_MODEL
    /// - `mock`: Creates a mock backend
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => OllamaBackend::from_env().map(LlmClient::Ollama),
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(LlmClient::OpenAICompatible)
            }
            "mock" => Some(LlmClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to ollama");
                OllamaBackend::from_env().map(LlmClient::Ollama)
            }
        }
    }

    /// Create an Ollama backend directly
    pub fn ollama(host: &str, model: &str) -> Self {
        LlmClient::Ollama(OllamaBackend::new(host, model))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        LlmClient::Mock(MockBackend::new())
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            LlmClient::Ollama(b) => LlmClient::Ollama(b.with_model(model)),
            LlmClient::OpenAICompatible(b) => LlmClient::OpenAICompatible(b.with_model(model)),
            LlmClient::Mock(b) => LlmClient::Mock(b.with_model(model)),
        }
    }
}

// Implement LlmBackend for LlmClient by delegating to the inner backend
#[async_trait]
impl LlmBackend for LlmClient {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        match self {
            LlmClient::Ollama(b) => b.chat(messages, options).await,
            LlmClient::OpenAICompatible(b) => b.chat(messages, options).await,
            LlmClient::Mock(b) => b.chat(messages, options).await,
        }
    }

    async fn generate_json(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &ChatOptions,
    ) -> Result<String> {
        match self {
            LlmClient::Ollama(b) => b.generate_json(prompt, system, options).await,
            LlmClient::OpenAICompatible(b) => b.generate_json(prompt, system, options).await,
            LlmClient::Mock(b) => b.generate_json(prompt, system, options).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            LlmClient::Ollama(b) => b.health_check().await,
            LlmClient::OpenAICompatible(b) => b.health_check().await,
            LlmClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            LlmClient::Ollama(b) => b.model(),
            LlmClient::OpenAICompatible(b) => b.model(),
            LlmClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            LlmClient::Ollama(b) => b.host(),
            LlmClient::OpenAICompatible(b) => b.host(),
            LlmClient::Mock(b) => b.host(),
        }
    }

    fn router_info(&self) -> RouterInfo {
        match self {
            LlmClient::Ollama(b) => b.router_info(),
            LlmClient::OpenAICompatible(b) => b.router_info(),
            LlmClient::Mock(b) => b.router_info(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_client_mock() {
        let client = LlmClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        let client = LlmClient::mock();
        assert!(client.health_check().await);
    }

    #[tokio::test]
    async fn test_mock_chat_delegates() {
        let client = LlmClient::mock();
        let reply = client
            .chat(&[ChatMessage::user("hello")], &ChatOptions::default())
            .await
            .unwrap();
        assert!(!reply.is_empty());
    }

    #[test]
    fn test_with_model_keeps_variant() {
        let client = LlmClient::ollama("http://localhost:11434", "llama3.2").with_model("qwen2.5");
        assert!(matches!(client, LlmClient::Ollama(_)));
        assert_eq!(client.model(), "qwen2.5");
    }
}
