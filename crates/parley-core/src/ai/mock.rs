//! Mock backend for testing
//!
//! Scriptable responses for both LLM calls. Useful for unit tests and
//! development without a running LLM server.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::model_router::TaskType;

use super::types::{ChatMessage, ChatOptions, Role, RouterInfo};
use super::LlmBackend;

/// Which backend call produced a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockRequestKind {
    Chat,
    Json,
}

/// What the mock saw for one call
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub kind: MockRequestKind,
    pub task: TaskType,
    pub system: Option<String>,
    /// User prompt, or the last user message for chat calls
    pub prompt: String,
}

type Responder = dyn Fn(&MockRequest) -> Result<String> + Send + Sync;

/// Mock LLM backend for testing
///
/// Returns predictable responses by default. Tests can install a responder
/// closure to script replies or failures per request.
#[derive(Clone)]
pub struct MockBackend {
    healthy: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    responder: Arc<Responder>,
    delay: Option<Duration>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(true)),
            calls: Arc::new(AtomicUsize::new(0)),
            responder: Arc::new(default_response),
            delay: None,
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        let backend = Self::new();
        backend.set_healthy(false);
        backend
    }

    /// Replace the responder
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&MockRequest) -> Result<String> + Send + Sync + 'static,
    {
        self.responder = Arc::new(responder);
        self
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Create a new instance with a different model (no-op for mock)
    pub fn with_model(&self, _model: &str) -> Self {
        self.clone()
    }

    /// Toggle health; shared by every clone
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of chat and JSON calls answered so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self, request: MockRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(&request)
    }
}

/// Default canned behavior per task
pub fn default_response(request: &MockRequest) -> Result<String> {
    let body = match (request.kind, request.task) {
        (MockRequestKind::Json, TaskType::Segmentation) => {
            let text = request
                .prompt
                .split_once("Text:\n")
                .map(|(_, text)| text)
                .unwrap_or(&request.prompt);
            let chunks: Vec<&str> = text
                .split("\n\n")
                .map(str::trim)
                .filter(|chunk| !chunk.is_empty())
                .collect();
            json!({ "chunks": chunks }).to_string()
        }
        (MockRequestKind::Json, _) => json!({ "transactions": [] }).to_string(),
        (MockRequestKind::Chat, _) => "Got it. Tell me about another transaction whenever you like.".to_string(),
    };
    Ok(body)
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        let system = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone());
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.respond(MockRequest {
            kind: MockRequestKind::Chat,
            task: options.task,
            system,
            prompt,
        })
        .await
    }

    async fn generate_json(
        &self,
        prompt: &str,
        system: Option<&str>,
        options: &ChatOptions,
    ) -> Result<String> {
        self.respond(MockRequest {
            kind: MockRequestKind::Json,
            task: options.task,
            system: system.map(str::to_string),
            prompt: prompt.to_string(),
        })
        .await
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }

    fn router_info(&self) -> RouterInfo {
        RouterInfo {
            default_model: "mock".to_string(),
            fallback_model: None,
            task_models: vec![],
        }
    }
}
