//! Pipeline configuration
//!
//! Same two-layer resolution as the model router: an override in the data
//! dir (~/.local/share/parley/config/pipeline.toml) wins, otherwise the
//! embedded defaults are used. Missing keys keep their default values.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_CONFIG: &str = include_str!("../../../config/pipeline.toml");

/// Extraction orchestrator settings
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub cache_ttl: Duration,
    pub cache_key_chars: usize,
    /// Inputs estimated above this token count skip the model step
    pub max_llm_tokens: usize,
}

/// Bulk chunking and batch scheduling settings
#[derive(Debug, Clone)]
pub struct BulkConfig {
    pub threshold_chars: usize,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub chunk_timeout: Duration,
    pub progress_start: u8,
    pub progress_end: u8,
}

/// Dialogue settings
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub max_reprompts: u32,
    pub recent_batches: usize,
    pub max_history: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub extraction: ExtractionConfig,
    pub bulk: BulkConfig,
    pub conversation: ConversationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig {
                cache_ttl: Duration::from_secs(300),
                cache_key_chars: 200,
                max_llm_tokens: 3000,
            },
            bulk: BulkConfig {
                threshold_chars: 1200,
                batch_size: 5,
                batch_pause: Duration::from_millis(250),
                chunk_timeout: Duration::from_secs(45),
                progress_start: 10,
                progress_end: 90,
            },
            conversation: ConversationConfig {
                max_reprompts: 3,
                recent_batches: 5,
                max_history: 200,
            },
        }
    }
}

impl PipelineConfig {
    /// Load from the override file or the embedded defaults
    pub fn load() -> Result<Self> {
        load_config(default_config_path().as_deref())
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("parley").join("config").join("pipeline.toml"))
}

fn load_config(override_path: Option<&Path>) -> Result<PipelineConfig> {
    let content = match override_path {
        Some(path) if path.exists() => fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?,
        _ => DEFAULT_CONFIG.to_string(),
    };
    parse_config(&content)
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    extraction: Option<RawExtraction>,
    bulk: Option<RawBulk>,
    conversation: Option<RawConversation>,
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    cache_ttl_secs: Option<u64>,
    cache_key_chars: Option<usize>,
    max_llm_tokens: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawBulk {
    threshold_chars: Option<usize>,
    batch_size: Option<usize>,
    batch_pause_ms: Option<u64>,
    chunk_timeout_secs: Option<u64>,
    progress_start: Option<u8>,
    progress_end: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct RawConversation {
    max_reprompts: Option<u32>,
    recent_batches: Option<usize>,
    max_history: Option<usize>,
}

fn parse_config(content: &str) -> Result<PipelineConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid pipeline TOML: {}", e)))?;

    let mut config = PipelineConfig::default();

    if let Some(extraction) = raw.extraction {
        if let Some(ttl) = extraction.cache_ttl_secs {
            config.extraction.cache_ttl = Duration::from_secs(ttl);
        }
        if let Some(chars) = extraction.cache_key_chars {
            config.extraction.cache_key_chars = chars.max(1);
        }
        if let Some(tokens) = extraction.max_llm_tokens {
            config.extraction.max_llm_tokens = tokens;
        }
    }

    if let Some(bulk) = raw.bulk {
        if let Some(threshold) = bulk.threshold_chars {
            config.bulk.threshold_chars = threshold;
        }
        if let Some(size) = bulk.batch_size {
            config.bulk.batch_size = size.max(1);
        }
        if let Some(pause) = bulk.batch_pause_ms {
            config.bulk.batch_pause = Duration::from_millis(pause);
        }
        if let Some(timeout) = bulk.chunk_timeout_secs {
            config.bulk.chunk_timeout = Duration::from_secs(timeout);
        }
        if let Some(start) = bulk.progress_start {
            config.bulk.progress_start = start.min(100);
        }
        if let Some(end) = bulk.progress_end {
            config.bulk.progress_end = end.min(100);
        }
    }

    if config.bulk.progress_end < config.bulk.progress_start {
        return Err(Error::Config(format!(
            "bulk.progress_end ({}) is below bulk.progress_start ({})",
            config.bulk.progress_end, config.bulk.progress_start
        )));
    }

    if let Some(conversation) = raw.conversation {
        if let Some(max) = conversation.max_reprompts {
            config.conversation.max_reprompts = max;
        }
        if let Some(batches) = conversation.recent_batches {
            config.conversation.recent_batches = batches;
        }
        if let Some(history) = conversation.max_history {
            config.conversation.max_history = history.max(2);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults_parse() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.bulk.batch_size, 5);
        assert_eq!(config.conversation.max_reprompts, 3);
        assert!(config.bulk.progress_start < config.bulk.progress_end);
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = PipelineConfig::from_toml("[bulk]\nbatch_size = 2\n").unwrap();
        assert_eq!(config.bulk.batch_size, 2);
        assert_eq!(config.bulk.threshold_chars, 1200);
        assert_eq!(config.extraction.cache_key_chars, 200);
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let config = PipelineConfig::from_toml("[bulk]\nbatch_size = 0\n").unwrap();
        assert_eq!(config.bulk.batch_size, 1);
    }

    #[test]
    fn test_inverted_progress_band_rejected() {
        let result = PipelineConfig::from_toml("[bulk]\nprogress_start = 80\nprogress_end = 20\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(&path, "[conversation]\nmax_reprompts = 1\n").unwrap();
        let config = PipelineConfig::from_path(&path).unwrap();
        assert_eq!(config.conversation.max_reprompts, 1);
    }
}
