//! LLM backend request and response types
//!
//! These types are backend-agnostic and used across all LLM implementations.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model_router::TaskType;

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a chat exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call options
#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Task used for model routing and the default timeout
    pub task: TaskType,
    pub temperature: Option<f32>,
    /// Overrides the router's timeout for the task
    pub timeout: Option<Duration>,
}

impl ChatOptions {
    pub fn for_task(task: TaskType) -> Self {
        Self {
            task,
            temperature: None,
            timeout: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self::for_task(TaskType::Conversation)
    }
}

/// Router configuration information for display
#[derive(Debug, Clone)]
pub struct RouterInfo {
    pub default_model: String,
    pub fallback_model: Option<String>,
    /// Task-specific model overrides (only non-default)
    pub task_models: Vec<(String, String)>,
}
