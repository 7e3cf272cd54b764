//! Model-backed extraction and segmentation
//!
//! Last step of the cascade. Only used when the backend answers its health
//! check and the input fits the token budget.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tracing::debug;

use crate::ai::parsing::{parse_chunks, parse_transactions};
use crate::ai::{ChatOptions, LlmBackend, LlmClient};
use crate::error::{Error, Result};
use crate::models::Transaction;
use crate::prompts::{PromptId, PromptLibrary, RenderedPrompt};

/// Rough token estimate: four characters per token
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Extraction and segmentation through the prompt library
#[derive(Clone)]
pub struct LlmExtractor {
    client: LlmClient,
    prompts: Arc<Mutex<PromptLibrary>>,
    max_tokens: usize,
}

impl LlmExtractor {
    pub fn new(client: LlmClient, max_tokens: usize) -> Self {
        Self::with_prompts(client, Arc::new(Mutex::new(PromptLibrary::new())), max_tokens)
    }

    /// Share an existing prompt library
    pub fn with_prompts(
        client: LlmClient,
        prompts: Arc<Mutex<PromptLibrary>>,
        max_tokens: usize,
    ) -> Self {
        Self {
            client,
            prompts,
            max_tokens,
        }
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }

    pub fn prompts(&self) -> &Arc<Mutex<PromptLibrary>> {
        &self.prompts
    }

    pub fn within_budget(&self, text: &str) -> bool {
        estimate_tokens(text) <= self.max_tokens
    }

    /// Backend reachable and input within the token budget
    pub async fn is_available(&self, text: &str) -> bool {
        if !self.within_budget(text) {
            debug!(
                tokens = estimate_tokens(text),
                budget = self.max_tokens,
                "Input over LLM token budget"
            );
            return false;
        }
        self.client.health_check().await
    }

    fn render(&self, id: PromptId, vars: &HashMap<&str, &str>) -> Result<RenderedPrompt> {
        let mut prompts = self
            .prompts
            .lock()
            .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
        prompts.render(id, vars)
    }

    /// Extract transactions from `text`
    ///
    /// `expected_count` tells the model how many transactions the user says
    /// the text holds.
    pub async fn extract(
        &self,
        text: &str,
        reference: NaiveDate,
        expected_count: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        let reference_date = reference.format("%Y-%m-%d").to_string();
        let expected = expected_count.map(|n| n.to_string());

        let mut vars = HashMap::new();
        vars.insert("reference_date", reference_date.as_str());
        vars.insert("text", text);
        if let Some(ref expected) = expected {
            vars.insert("expected_count", expected.as_str());
        }
        let prompt = self.render(PromptId::ExtractTransactions, &vars)?;

        let options = ChatOptions::for_task(prompt.task).with_temperature(0.0);
        let response = self
            .client
            .generate_json(&prompt.user, prompt.system.as_deref(), &options)
            .await?;
        let transactions = parse_transactions(&response)?;
        debug!(count = transactions.len(), ?expected_count, "LLM extraction finished");
        Ok(transactions)
    }

    /// Split a bulk paste into chunks of whole transactions
    pub async fn segment(&self, text: &str) -> Result<Vec<String>> {
        let mut vars = HashMap::new();
        vars.insert("text", text);
        let prompt = self.render(PromptId::SegmentStatement, &vars)?;

        let options = ChatOptions::for_task(prompt.task).with_temperature(0.0);
        let response = self
            .client
            .generate_json(&prompt.user, prompt.system.as_deref(), &options)
            .await?;
        parse_chunks(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{MockBackend, MockRequestKind};
    use crate::model_router::TaskType;
    use crate::models::Direction;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 14).unwrap()
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[tokio::test]
    async fn test_extract_renders_prompt_and_parses() {
        let mock = MockBackend::new().with_responder(|req| {
            assert_eq!(req.kind, MockRequestKind::Json);
            assert_eq!(req.task, TaskType::StructuredExtraction);
            assert!(req.prompt.contains("Reference date: 2025-04-14"));
            assert!(req.prompt.contains("exactly 3 transactions"));
            assert!(req.system.is_some());
            Ok(r#"[{"date":"2025-04-10","description":"Rent","amount":"1200","direction":"OUT"}]"#.into())
        });
        let extractor = LlmExtractor::new(LlmClient::Mock(mock), 1000);
        let txs = extractor
            .extract("rent was due", reference(), Some(3))
            .await
            .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].direction, Direction::Out);
        assert_eq!(txs[0].amount, 1200.0);
    }

    #[tokio::test]
    async fn test_hint_block_dropped_without_count() {
        let mock = MockBackend::new().with_responder(|req| {
            assert!(!req.prompt.contains("{{"));
            assert!(!req.prompt.contains("exactly"));
            Ok(r#"{"transactions": []}"#.into())
        });
        let extractor = LlmExtractor::new(LlmClient::Mock(mock), 1000);
        assert!(extractor.extract("x", reference(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_availability_respects_budget_and_health() {
        let extractor = LlmExtractor::new(LlmClient::mock(), 2);
        assert!(extractor.is_available("short").await);
        assert!(!extractor.is_available("this text is well over budget").await);

        let down = LlmExtractor::new(LlmClient::Mock(MockBackend::unhealthy()), 100);
        assert!(!down.is_available("short").await);
    }

    #[tokio::test]
    async fn test_segment_with_default_mock() {
        let extractor = LlmExtractor::new(LlmClient::mock(), 1000);
        let chunks = extractor.segment("A $1\n\nB $2").await.unwrap();
        assert_eq!(chunks, vec!["A $1".to_string(), "B $2".to_string()]);
    }
}
