//! OpenAI-compatible backend implementation
//!
//! Works with any local server implementing the OpenAI `/v1/chat/completions`
//! API: vLLM, LocalAI, llama-server, Docker Model Runner and others.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model_router::ModelRouter;

use super::http::{non_empty, run_call, send_json, CallPlan};
use super::types::{ChatMessage, ChatOptions, RouterInfo};
use super::LlmBackend;

/// OpenAI-compatible backend
///
/// # Example
///
/// ```rust,ignore
/// // vLLM
/// export OPENAI_COMPATIBLE_HOST="http://192.168.1.100:8000"
/// export OPENAI_COMPATIBLE_MODEL="meta-llama/Llama-3.2-3B-Instruct"
///
/// // llama-server
/// export OPENAI_COMPATIBLE_HOST="http://localhost:8080"
/// export OPENAI_COMPATIBLE_MODEL="llama-3.2-3b"
/// ```
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    router: Arc<RwLock<ModelRouter>>,
}

impl Clone for OpenAICompatibleBackend {
    fn clone(&self) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            router: self.router.clone(),
        }
    }
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        let router = ModelRouter::new().unwrap_or_default();
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            router: Arc::new(RwLock::new(router)),
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        let mut backend = Self::new(base_url, model);
        backend.api_key = Some(api_key.to_string());
        backend
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            model: model.to_string(),
            api_key: self.api_key.clone(),
            router: self.router.clone(),
        }
    }

    /// Create from environment variables
    ///
    /// Required: `OPENAI_COMPATIBLE_HOST`
    /// Optional: `OPENAI_COMPATIBLE_MODEL` (default: gpt-3.5-turbo)
    /// Optional: `OPENAI_COMPATIBLE_API_KEY`
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OPENAI_COMPATIBLE_HOST").ok()?;
        let model = std::env::var("OPENAI_COMPATIBLE_MODEL")
            .unwrap_or_else(|_| "gpt-3.5-turbo".to_string());
        match std::env::var("OPENAI_COMPATIBLE_API_KEY") {
            Ok(api_key) => Some(Self::with_api_key(&host, &model, &api_key)),
            Err(_) => Some(Self::new(&host, &model)),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_key {
            Some(ref api_key) => request.header("Authorization", format!("Bearer {}", api_key)),
            None => request,
        }
    }

    /// Make a routed chat completion request
    async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
        json_mode: bool,
    ) -> Result<String> {
        let plan = CallPlan::resolve(&self.router, options, &self.model);
        let url = format!("{}/v1/chat/completions", self.base_url);
        let (plan, url) = (&plan, &url);

        run_call(&self.router, plan, || async move {
            let request = ChatCompletionRequest {
                model: &plan.model,
                messages,
                temperature: options.temperature,
                response_format: json_mode.then_some(ResponseFormat {
                    kind: "json_object",
                }),
                stream: false,
            };
            let response: ChatCompletionResponse = send_json(
                self.authorized(self.http_client.post(url).json(&request)),
                plan.timeout,
            )
            .await?;

            let content = response
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| Error::MalformedResponse("no choices in completion".into()))?;
            debug!(model = %plan.model, task = plan.task.as_str(), "OpenAI-compatible response: {}", content);
            non_empty(content)
        })
        .await
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmBackend for OpenAICompatibleBackend {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        self.chat_completion(messages, options, false).await
    }

    async fn generate_json(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &ChatOptions,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));
        self.chat_completion(&messages, options, true).await
    }

    async fn health_check(&self) -> bool {
        // Try /v1/models first (standard OpenAI endpoint)
        if let Ok(resp) = self
            .authorized(self.http_client.get(format!("{}/v1/models", self.base_url)))
            .send()
            .await
        {
            if resp.status().is_success() {
                return true;
            }
        }

        // Try /health (common for LocalAI, llama-server)
        if let Ok(resp) = self
            .http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            if resp.status().is_success() {
                return true;
            }
        }

        false
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }

    fn router_info(&self) -> RouterInfo {
        let mut fallback_model = None;
        let mut task_models = Vec::new();

        if let Ok(router) = self.router.read() {
            fallback_model = router.config().fallback_model.clone();
            for task in crate::model_router::TaskType::all() {
                let model = router.select_model(*task, &self.model);
                if model != self.model {
                    task_models.push((task.as_str().to_string(), model));
                }
            }
        }

        RouterInfo {
            default_model: self.model.clone(),
            fallback_model,
            task_models,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_new() {
        let backend = OpenAICompatibleBackend::new("http://localhost:12434", "llama3.2");
        assert_eq!(backend.model(), "llama3.2");
        assert_eq!(backend.host(), "http://localhost:12434");
    }

    #[test]
    fn test_backend_new_trims_trailing_slash() {
        let backend = OpenAICompatibleBackend::new("http://localhost:12434/", "llama3.2");
        assert_eq!(backend.host(), "http://localhost:12434");
    }

    #[test]
    fn test_backend_with_api_key() {
        let backend =
            OpenAICompatibleBackend::with_api_key("http://localhost:12434", "gpt-4", "sk-test123");
        assert_eq!(backend.api_key, Some("sk-test123".to_string()));
        assert_eq!(backend.with_model("other").api_key, Some("sk-test123".to_string()));
    }

    #[test]
    fn test_json_mode_request_shape() {
        let messages = [ChatMessage::system("sys"), ChatMessage::user("text")];
        let request = ChatCompletionRequest {
            model: "m",
            messages: &messages,
            temperature: Some(0.0),
            response_format: Some(ResponseFormat {
                kind: "json_object",
            }),
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "system");
    }

    #[test]
    fn test_null_content_is_accepted_by_decoder() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
