//! Shared command utilities

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use parley_core::{LlmClient, PipelineConfig, Services};

/// Build the pipeline services from the environment and config file
///
/// Without a configured backend the local strategies still work; only the
/// model fallback and model-written replies are unavailable.
pub fn open_services() -> Result<Services> {
    let config = PipelineConfig::load().context("Failed to load pipeline config")?;
    let llm = LlmClient::from_env();
    if llm.is_none() {
        tracing::info!("No LLM backend configured, using local extraction only");
    }
    Ok(Services::new(llm, config))
}

/// Parse `--reference-date`, defaulting to today
pub fn resolve_reference_date(value: Option<&str>) -> Result<NaiveDate> {
    match value {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .context("Invalid --reference-date format (use YYYY-MM-DD)"),
        None => Ok(Local::now().date_naive()),
    }
}

/// Text from `--text`, or the contents of `--file`
pub fn read_input(text: Option<String>, file: Option<&Path>) -> Result<String> {
    match (text, file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display())),
        (None, None) => anyhow::bail!("Provide --text or --file"),
    }
}
