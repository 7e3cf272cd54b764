//! Test utilities for parley-core
//!
//! A mock Ollama server for HTTP-level tests of the backends and the
//! pipeline. It answers the three endpoints Parley uses with canned,
//! deterministic output derived from the prompt.

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Clone, Default)]
struct ServerState {
    /// Status returned by generate and chat instead of a reply
    failure: Option<u16>,
    requests: Arc<AtomicUsize>,
}

/// Mock Ollama server for testing
pub struct MockOllamaServer {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOllamaServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::launch(ServerState::default()).await
    }

    /// Start a server whose generate and chat endpoints answer with `status`
    ///
    /// The health endpoint still succeeds, so callers get past the health
    /// check and hit the failure on the real call.
    pub async fn failing(status: u16) -> Self {
        Self::launch(ServerState {
            failure: Some(status),
            ..Default::default()
        })
        .await
    }

    async fn launch(state: ServerState) -> Self {
        let requests = state.requests.clone();
        let app = Router::new()
            .route("/api/tags", get(handle_tags))
            .route("/api/generate", post(handle_generate))
            .route("/api/chat", post(handle_chat))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Generate and chat requests received so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOllamaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ollama tags endpoint response (health check)
async fn handle_tags() -> Json<TagsResponse> {
    Json(TagsResponse {
        models: vec![ModelInfo {
            name: "llama3.2:latest".to_string(),
            modified_at: "2025-01-01T00:00:00Z".to_string(),
            size: 2_000_000_000,
        }],
    })
}

/// Ollama generate endpoint: segmentation or extraction, picked from the prompt
async fn handle_generate(
    State(state): State<ServerState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if let Some(status) = state.failure {
        return failure(status);
    }

    let text = request
        .prompt
        .split_once("Text:\n")
        .map(|(_, text)| text)
        .unwrap_or(&request.prompt);

    let response = if request.prompt.starts_with("Reference date:") {
        extraction_mock(text)
    } else {
        segmentation_mock(text)
    };

    Json(GenerateResponse {
        model: request.model,
        response,
        done: true,
    })
    .into_response()
}

/// Ollama chat endpoint: echoes the last user message
async fn handle_chat(State(state): State<ServerState>, Json(request): Json<ChatRequest>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if let Some(status) = state.failure {
        return failure(status);
    }

    let last = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or("");

    Json(json!({
        "model": request.model,
        "message": { "role": "assistant", "content": format!("Mock reply to: {}", last) },
        "done": true
    }))
    .into_response()
}

fn failure(status: u16) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, "mock failure").into_response()
}

/// Blank-line separated paragraphs become chunks
fn segmentation_mock(text: &str) -> String {
    let chunks: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect();
    json!({ "chunks": chunks }).to_string()
}

/// Every line with a `$` amount becomes one transaction
fn extraction_mock(text: &str) -> String {
    let transactions: Vec<serde_json::Value> = text
        .lines()
        .filter_map(|line| {
            let (description, rest) = line.split_once('$')?;
            let digits: String = rest
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
                .filter(|c| *c != ',')
                .collect();
            let amount: f64 = digits.trim_end_matches('.').parse().ok()?;
            let lower = line.to_lowercase();
            let direction = if lower.contains("paid") || lower.contains("spent") {
                "OUT"
            } else if lower.contains("received") {
                "IN"
            } else {
                "UNKNOWN"
            };
            Some(json!({
                "date": "unknown",
                "description": description.trim(),
                "amount": amount,
                "direction": direction
            }))
        })
        .collect();
    json!({ "transactions": transactions }).to_string()
}

#[derive(Serialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Serialize)]
struct ModelInfo {
    name: String,
    modified_at: String,
    size: u64,
}

#[derive(Deserialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
}

#[derive(Serialize)]
struct GenerateResponse {
    model: String,
    response: String,
    done: bool,
}

#[derive(Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatRequestMessage>,
}

#[derive(Deserialize)]
struct ChatRequestMessage {
    role: String,
    content: String,
}
