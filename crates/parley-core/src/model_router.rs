//! Model Router for task-based model selection
//!
//! Picks a model per pipeline task (statement segmentation, structured
//! extraction, conversational replies), tracks consecutive failures per model
//! and falls back when a model is marked unhealthy. An unhealthy model is
//! tried again once the recovery wait has passed.
//!
//! ## Configuration Resolution
//!
//! 1. Override in the data dir (~/.local/share/parley/config/models.toml)
//! 2. Embedded defaults compiled into the binary

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/models.toml");

/// Task types for model routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// Split a bulk paste into per-transaction chunks
    Segmentation,
    /// JSON transaction extraction
    StructuredExtraction,
    /// Free-form assistant replies
    Conversation,
}

impl TaskType {
    /// Config key for this task type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Segmentation => "segmentation",
            Self::StructuredExtraction => "structured_extraction",
            Self::Conversation => "conversation",
        }
    }

    pub fn all() -> &'static [TaskType] {
        &[
            Self::Segmentation,
            Self::StructuredExtraction,
            Self::Conversation,
        ]
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.as_str() == key)
    }
}

/// Configuration for a specific task type
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub model: String,
    /// Bounded wait for one call
    pub timeout: Duration,
    pub max_retries: u32,
}

#[derive(Debug, Default)]
struct ModelHealth {
    failures: u32,
    unhealthy_since: Option<Instant>,
}

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub default_model: String,
    pub default_timeout: Duration,
    pub default_retries: u32,
    /// Model to use while the primary is unhealthy
    pub fallback_model: Option<String>,
    pub tasks: HashMap<TaskType, TaskConfig>,
    /// Consecutive failures before a model is marked unhealthy
    pub failure_threshold: u32,
    /// How long an unhealthy model is skipped
    pub recovery_wait: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_model: "llama3.2".to_string(),
            default_timeout: Duration::from_secs(30),
            default_retries: 1,
            fallback_model: None,
            tasks: HashMap::new(),
            failure_threshold: 3,
            recovery_wait: Duration::from_secs(120),
        }
    }
}

/// Model Router for task-based model selection
pub struct ModelRouter {
    config: RouterConfig,
    health: HashMap<String, ModelHealth>,
}

impl ModelRouter {
    /// Create a router from the override file or the embedded defaults
    pub fn new() -> Result<Self> {
        let config = load_config(default_config_path().as_deref())?;
        Ok(Self::with_config(config))
    }

    pub fn with_config_path(path: &Path) -> Result<Self> {
        let config = load_config(Some(path))?;
        Ok(Self::with_config(config))
    }

    /// Create with an explicit configuration (for testing)
    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            config,
            health: HashMap::new(),
        }
    }

    /// Model to use for a task, honoring health-based fallback
    pub fn model_for_task(&self, task: TaskType) -> &str {
        if let Some(task_config) = self.config.tasks.get(&task) {
            if self.is_healthy(&task_config.model) {
                return &task_config.model;
            }
        }

        if self.is_healthy(&self.config.default_model) {
            return &self.config.default_model;
        }

        if let Some(ref fallback) = self.config.fallback_model {
            if self.is_healthy(fallback) {
                return fallback;
            }
        }

        // Nothing healthy: use the default and let the call fail
        &self.config.default_model
    }

    /// Model for a task when the caller has its own default model
    ///
    /// A task-specific model from the config wins while healthy; otherwise
    /// the caller's model is used, then the fallback.
    pub fn select_model(&self, task: TaskType, caller_default: &str) -> String {
        if let Some(task_config) = self.config.tasks.get(&task) {
            if task_config.model != self.config.default_model && self.is_healthy(&task_config.model)
            {
                return task_config.model.clone();
            }
        }
        if self.is_healthy(caller_default) {
            return caller_default.to_string();
        }
        match self.config.fallback_model.as_deref() {
            Some(fallback) if self.is_healthy(fallback) => fallback.to_string(),
            _ => caller_default.to_string(),
        }
    }

    pub fn timeout_for_task(&self, task: TaskType) -> Duration {
        self.config
            .tasks
            .get(&task)
            .map(|c| c.timeout)
            .unwrap_or(self.config.default_timeout)
    }

    pub fn retries_for_task(&self, task: TaskType) -> u32 {
        self.config
            .tasks
            .get(&task)
            .map(|c| c.max_retries)
            .unwrap_or(self.config.default_retries)
    }

    pub fn record_success(&mut self, model: &str) {
        let health = self.health.entry(model.to_string()).or_default();
        health.failures = 0;
        health.unhealthy_since = None;
    }

    /// Record a failed call, returns true if the model is now unhealthy
    pub fn record_failure(&mut self, model: &str) -> bool {
        let threshold = self.config.failure_threshold;
        let health = self.health.entry(model.to_string()).or_default();
        health.failures += 1;
        if health.failures >= threshold {
            // Restart the recovery clock on every failure past the threshold
            health.unhealthy_since = Some(Instant::now());
            true
        } else {
            false
        }
    }

    pub fn is_healthy(&self, model: &str) -> bool {
        match self.health.get(model) {
            Some(health) if health.failures >= self.config.failure_threshold => health
                .unhealthy_since
                .map(|since| since.elapsed() >= self.config.recovery_wait)
                .unwrap_or(false),
            _ => true,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new().unwrap_or_else(|_| Self::with_config(RouterConfig::default()))
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("parley").join("config").join("models.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<RouterConfig> {
    let content = match override_path {
        Some(path) if path.exists() => fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?,
        _ => DEFAULT_CONFIG.to_string(),
    };
    parse_config(&content)
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    defaults: Option<RawDefaults>,
    models: Option<HashMap<String, RawTaskConfig>>,
    health: Option<RawHealth>,
}

#[derive(Debug, Deserialize)]
struct RawDefaults {
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    fallback_model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTaskConfig {
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawHealth {
    failure_threshold: Option<u32>,
    recovery_wait_secs: Option<u64>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<RouterConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid models TOML: {}", e)))?;

    let mut config = RouterConfig::default();

    if let Some(defaults) = raw.defaults {
        if let Some(model) = defaults.model {
            config.default_model = model;
        }
        if let Some(timeout) = defaults.timeout_secs {
            config.default_timeout = Duration::from_secs(timeout);
        }
        if let Some(retries) = defaults.max_retries {
            config.default_retries = retries;
        }
        if let Some(fallback) = defaults.fallback_model {
            config.fallback_model = Some(fallback);
        }
    }

    if let Some(models) = raw.models {
        for (task_name, task_config) in models {
            let Some(task) = TaskType::from_key(&task_name) else {
                tracing::warn!(task = %task_name, "Ignoring unknown task in models config");
                continue;
            };

            config.tasks.insert(
                task,
                TaskConfig {
                    model: task_config
                        .model
                        .unwrap_or_else(|| config.default_model.clone()),
                    timeout: task_config
                        .timeout_secs
                        .map(Duration::from_secs)
                        .unwrap_or(config.default_timeout),
                    max_retries: task_config.max_retries.unwrap_or(config.default_retries),
                },
            );
        }
    }

    if let Some(health) = raw.health {
        if let Some(threshold) = health.failure_threshold {
            config.failure_threshold = threshold.max(1);
        }
        if let Some(wait) = health.recovery_wait_secs {
            config.recovery_wait = Duration::from_secs(wait);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_config() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.default_model, "llama3.2");
        assert!(config.fallback_model.is_some());
        assert!(config.tasks.contains_key(&TaskType::Segmentation));
    }

    #[test]
    fn test_task_type_keys() {
        assert_eq!(TaskType::StructuredExtraction.as_str(), "structured_extraction");
        assert_eq!(TaskType::from_key("segmentation"), Some(TaskType::Segmentation));
        assert_eq!(TaskType::from_key("vision"), None);
    }

    #[test]
    fn test_router_model_selection() {
        let mut tasks = HashMap::new();
        tasks.insert(
            TaskType::StructuredExtraction,
            TaskConfig {
                model: "qwen2.5:7b".to_string(),
                timeout: Duration::from_secs(60),
                max_retries: 1,
            },
        );

        let router = ModelRouter::with_config(RouterConfig {
            default_model: "llama3.2".to_string(),
            tasks,
            ..Default::default()
        });

        assert_eq!(router.model_for_task(TaskType::Conversation), "llama3.2");
        assert_eq!(router.model_for_task(TaskType::StructuredExtraction), "qwen2.5:7b");
        assert_eq!(
            router.timeout_for_task(TaskType::StructuredExtraction),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_health_tracking() {
        let mut router = ModelRouter::with_config(RouterConfig {
            failure_threshold: 2,
            ..Default::default()
        });

        assert!(router.is_healthy("m"));
        assert!(!router.record_failure("m"));
        assert!(router.is_healthy("m"));
        assert!(router.record_failure("m"));
        assert!(!router.is_healthy("m"));

        router.record_success("m");
        assert!(router.is_healthy("m"));
    }

    #[test]
    fn test_recovers_after_wait() {
        let mut router = ModelRouter::with_config(RouterConfig {
            failure_threshold: 1,
            recovery_wait: Duration::from_millis(0),
            ..Default::default()
        });
        router.record_failure("m");
        assert!(router.is_healthy("m"));
    }

    #[test]
    fn test_fallback_on_unhealthy() {
        let mut router = ModelRouter::with_config(RouterConfig {
            default_model: "primary".to_string(),
            fallback_model: Some("fallback".to_string()),
            failure_threshold: 1,
            ..Default::default()
        });

        assert_eq!(router.model_for_task(TaskType::Segmentation), "primary");
        router.record_failure("primary");
        assert_eq!(router.model_for_task(TaskType::Segmentation), "fallback");
    }

    #[test]
    fn test_select_model_prefers_caller_default() {
        let mut router = ModelRouter::with_config(RouterConfig {
            default_model: "llama3.2".to_string(),
            fallback_model: Some("qwen2.5:3b".to_string()),
            failure_threshold: 1,
            ..Default::default()
        });
        assert_eq!(router.select_model(TaskType::Conversation, "mistral"), "mistral");
        router.record_failure("mistral");
        assert_eq!(router.select_model(TaskType::Conversation, "mistral"), "qwen2.5:3b");
    }

    #[test]
    fn test_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.toml");
        fs::write(
            &path,
            "[defaults]\nmodel = \"mistral\"\n\n[models.conversation]\ntimeout_secs = 5\n",
        )
        .unwrap();

        let router = ModelRouter::with_config_path(&path).unwrap();
        assert_eq!(router.config().default_model, "mistral");
        assert_eq!(
            router.timeout_for_task(TaskType::Conversation),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        assert!(matches!(parse_config("[defaults"), Err(Error::Config(_))));
    }
}
