//! Ollama backend implementation
//!
//! HTTP client for the Ollama API. Uses the model router for task-based model
//! selection, bounded waits and health-based fallback.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::model_router::{ModelRouter, TaskType};

use super::http::{non_empty, run_call, send_json, CallPlan};
use super::types::{ChatMessage, ChatOptions, RouterInfo};
use super::LlmBackend;

/// Ollama backend with model router integration
///
/// # Task Types
///
/// - `Segmentation`: splitting a bulk paste into chunks (JSON output)
/// - `StructuredExtraction`: transaction extraction (JSON output)
/// - `Conversation`: assistant replies
///
/// # Configuration
///
/// Configure routing via `~/.local/share/parley/config/models.toml`:
///
/// ```toml
/// [defaults]
/// model = "llama3.2"
///
/// [models.segmentation]
/// model = "qwen2.5:7b"
/// timeout_secs = 90
/// ```
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    router: Arc<RwLock<ModelRouter>>,
    default_model: String,
}

impl Clone for OllamaBackend {
    fn clone(&self) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            router: self.router.clone(),
            default_model: self.default_model.clone(),
        }
    }
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, default_model: &str) -> Self {
        let router = ModelRouter::new().unwrap_or_default();
        Self::with_router(base_url, default_model, router)
    }

    /// Create a new instance with a different model
    ///
    /// The router and its health state are shared with the original.
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            router: self.router.clone(),
            default_model: model.to_string(),
        }
    }

    /// Create with a custom router
    pub fn with_router(base_url: &str, default_model: &str, router: ModelRouter) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            router: Arc::new(RwLock::new(router)),
            default_model: default_model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
        Some(Self::new(&host, &model))
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Request to the Ollama chat API
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessage,
}

/// Request to the Ollama generate API
#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    format: &'static str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

/// Response from the Ollama generate API
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        let plan = CallPlan::resolve(&self.router, options, &self.default_model);
        let url = format!("{}/api/chat", self.base_url);
        let (plan, url) = (&plan, &url);

        run_call(&self.router, plan, || async move {
            let request = OllamaChatRequest {
                model: &plan.model,
                messages,
                stream: false,
                options: options.temperature.map(|temperature| OllamaOptions { temperature }),
            };
            let response: OllamaChatResponse =
                send_json(self.http_client.post(url).json(&request), plan.timeout).await?;
            debug!(model = %plan.model, "Ollama chat response: {}", response.message.content);
            non_empty(response.message.content)
        })
        .await
    }

    async fn generate_json(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &ChatOptions,
    ) -> Result<String> {
        let plan = CallPlan::resolve(&self.router, options, &self.default_model);
        let url = format!("{}/api/generate", self.base_url);
        let (plan, url) = (&plan, &url);

        run_call(&self.router, plan, || async move {
            let request = OllamaGenerateRequest {
                model: &plan.model,
                prompt,
                system,
                format: "json",
                stream: false,
                options: options.temperature.map(|temperature| OllamaOptions { temperature }),
            };
            let response: OllamaGenerateResponse =
                send_json(self.http_client.post(url).json(&request), plan.timeout).await?;
            debug!(model = %plan.model, task = plan.task.as_str(), "Ollama generate response: {}", response.response);
            non_empty(response.response)
        })
        .await
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.default_model
    }

    fn host(&self) -> &str {
        &self.base_url
    }

    fn router_info(&self) -> RouterInfo {
        let mut task_models = Vec::new();
        let mut default_model = self.default_model.clone();
        let mut fallback_model = None;

        if let Ok(router) = self.router.read() {
            default_model = router.config().default_model.clone();
            fallback_model = router.config().fallback_model.clone();

            for task in TaskType::all() {
                let model = router.model_for_task(*task);
                // Only include if different from default
                if model != default_model {
                    task_models.push((task.as_str().to_string(), model.to_string()));
                }
            }
        }

        RouterInfo {
            default_model,
            fallback_model,
            task_models,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_new_trims_trailing_slash() {
        let backend = OllamaBackend::new("http://localhost:11434/", "llama3.2");
        assert_eq!(backend.host(), "http://localhost:11434");
        assert_eq!(backend.model(), "llama3.2");
    }

    #[test]
    fn test_chat_request_shape() {
        let messages = [ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let request = OllamaChatRequest {
            model: "llama3.2",
            messages: &messages,
            stream: false,
            options: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["stream"], false);
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_generate_request_requests_json() {
        let request = OllamaGenerateRequest {
            model: "llama3.2",
            prompt: "extract",
            system: Some("sys"),
            format: "json",
            stream: false,
            options: Some(OllamaOptions { temperature: 0.0 }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["format"], "json");
        assert_eq!(json["system"], "sys");
        assert_eq!(json["options"]["temperature"], 0.0);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unavailable() {
        let backend = OllamaBackend::with_router(
            "http://127.0.0.1:9",
            "llama3.2",
            ModelRouter::with_config(crate::model_router::RouterConfig {
                default_retries: 0,
                ..Default::default()
            }),
        );
        let err = backend
            .chat(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_upstream());
        assert!(!backend.health_check().await);
    }

    fn no_retries() -> ModelRouter {
        ModelRouter::with_config(crate::model_router::RouterConfig {
            default_retries: 0,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_round_trip_against_mock_server() {
        use crate::test_utils::MockOllamaServer;

        let server = MockOllamaServer::start().await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");
        assert!(backend.health_check().await);

        let reply = backend
            .chat(&[ChatMessage::user("hello")], &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(reply, "Mock reply to: hello");

        let json = backend
            .generate_json("Text:\nA $1\n\nB $2", None, &ChatOptions::default())
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["chunks"].as_array().unwrap().len(), 2);
        assert_eq!(server.request_count(), 2);
    }

    #[tokio::test]
    async fn test_status_codes_map_to_typed_errors() {
        use crate::error::Error;
        use crate::test_utils::MockOllamaServer;

        let server = MockOllamaServer::failing(429).await;
        let backend = OllamaBackend::with_router(&server.url(), "llama3.2", no_retries());
        let err = backend
            .generate_json("x", None, &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited(_)));

        let server = MockOllamaServer::failing(401).await;
        let backend = OllamaBackend::with_router(&server.url(), "llama3.2", no_retries());
        let err = backend
            .chat(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}
