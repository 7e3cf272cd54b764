//! Extraction orchestrator
//!
//! Turns one block of text into validated transactions, trying the cheap
//! deterministic strategies before paying for a model call:
//!
//! 1. bank-statement blocks
//! 2. conversational templates
//! 3. LLM structured extraction (backend healthy, input within budget)
//!
//! The first strategy with a non-empty result wins. Failures inside a strategy
//! count as "found nothing", so `extract` always returns a result.

pub mod amounts;
pub mod cache;
pub mod conversational;
pub mod dates;
pub mod llm;
pub mod statement;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::categorize::{category_for_direction, CategoryClassifier, KeywordClassifier};
use crate::config::ExtractionConfig;
use crate::error::Result;
use crate::models::{new_id, ExtractionBatch, Transaction};

pub use cache::ExtractionCache;
pub use llm::LlmExtractor;

/// Which step of the cascade produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// No amount in the text, or every strategy came back empty
    None,
    Statement,
    Conversational,
    Llm,
    Cache,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Statement => "statement",
            Self::Conversational => "conversational",
            Self::Llm => "llm",
            Self::Cache => "cache",
        }
    }
}

/// Output of one extraction call
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub batch_id: String,
    pub transactions: Vec<Transaction>,
    pub strategy: Strategy,
}

impl ExtractionResult {
    fn empty() -> Self {
        Self {
            batch_id: new_id(),
            transactions: Vec::new(),
            strategy: Strategy::None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn to_batch(&self, source_text: &str) -> ExtractionBatch {
        ExtractionBatch::new(&self.batch_id, source_text, &self.transactions)
    }
}

/// Extraction of one bulk chunk
///
/// Unlike `ExtractionOrchestrator::extract`, errors are reported so the bulk
/// scheduler can mark the chunk as failed.
#[async_trait]
pub trait ChunkExtractor: Send + Sync {
    async fn extract_chunk(&self, text: &str, reference: NaiveDate) -> Result<Vec<Transaction>>;
}

/// Strategy cascade with a shared result cache
///
/// Clones share the cache and the prompt library.
#[derive(Clone)]
pub struct ExtractionOrchestrator {
    llm: Option<LlmExtractor>,
    classifier: Arc<dyn CategoryClassifier>,
    cache: ExtractionCache,
}

impl ExtractionOrchestrator {
    pub fn new(llm: Option<LlmExtractor>, config: &ExtractionConfig) -> Self {
        Self {
            llm,
            classifier: Arc::new(KeywordClassifier::new()),
            cache: ExtractionCache::new(config.cache_ttl, config.cache_key_chars),
        }
    }

    /// Orchestrator without a model step
    pub fn local_only(config: &ExtractionConfig) -> Self {
        Self::new(None, config)
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn CategoryClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn llm(&self) -> Option<&LlmExtractor> {
        self.llm.as_ref()
    }

    pub fn classifier(&self) -> &dyn CategoryClassifier {
        self.classifier.as_ref()
    }

    pub fn cache(&self) -> &ExtractionCache {
        &self.cache
    }

    /// Run the cascade on `text`
    pub async fn extract(&self, text: &str, reference: NaiveDate) -> ExtractionResult {
        if !amounts::has_amount_pattern(text) {
            debug!("No amount pattern, skipping extraction");
            return ExtractionResult::empty();
        }

        if let Some(cached) = self.cache.get(text) {
            debug!(count = cached.len(), "Extraction cache hit");
            return self.finish(cached, Strategy::Cache);
        }

        let (transactions, strategy) = match self.extract_local(text, reference) {
            (local, strategy) if !local.is_empty() => (local, strategy),
            _ => match self.extract_llm(text, reference, None).await {
                Some(found) if !found.is_empty() => (found, Strategy::Llm),
                _ => (Vec::new(), Strategy::None),
            },
        };

        let result = self.finish(transactions, strategy);
        if !result.is_empty() {
            self.cache.put(text, &result.transactions);
        }
        info!(
            strategy = result.strategy.as_str(),
            count = result.transactions.len(),
            "Extraction finished"
        );
        result
    }

    /// Re-extract with the model, telling it how many transactions to expect
    ///
    /// Bypasses the cache. Falls back to the local strategies when the model
    /// is unavailable or returns nothing.
    pub async fn extract_with_hint(
        &self,
        text: &str,
        reference: NaiveDate,
        expected_count: usize,
    ) -> ExtractionResult {
        if let Some(found) = self.extract_llm(text, reference, Some(expected_count)).await {
            if !found.is_empty() {
                return self.finish(found, Strategy::Llm);
            }
        }
        let (local, strategy) = self.extract_local(text, reference);
        self.finish(local, strategy)
    }

    /// Statement blocks first, conversational templates second
    pub fn extract_local(&self, text: &str, reference: NaiveDate) -> (Vec<Transaction>, Strategy) {
        let found = statement::extract_statement(text, reference);
        if !found.is_empty() {
            return (found, Strategy::Statement);
        }
        let found = conversational::extract_conversational(text, reference);
        if !found.is_empty() {
            return (found, Strategy::Conversational);
        }
        (Vec::new(), Strategy::None)
    }

    /// Model step; `None` when unavailable or failed
    async fn extract_llm(
        &self,
        text: &str,
        reference: NaiveDate,
        expected_count: Option<usize>,
    ) -> Option<Vec<Transaction>> {
        let llm = self.llm.as_ref()?;
        if !llm.is_available(text).await {
            debug!("LLM extraction unavailable");
            return None;
        }
        match llm.extract(text, reference, expected_count).await {
            Ok(found) => Some(found),
            Err(e) => {
                warn!(error = %e, "LLM extraction failed, treating as no result");
                None
            }
        }
    }

    /// Assign categories from description and direction
    pub fn categorize(&self, tx: &mut Transaction) {
        let base = self.classifier.categorize(&tx.description, &tx.payment_type);
        tx.category = category_for_direction(
            self.classifier.as_ref(),
            base,
            tx.direction,
            &tx.description,
            &tx.payment_type,
        );
    }

    /// Stamp fresh identities and a shared batch id
    fn finish(&self, mut transactions: Vec<Transaction>, strategy: Strategy) -> ExtractionResult {
        let batch_id = new_id();
        for tx in &mut transactions {
            tx.id = new_id();
            tx.batch_id = batch_id.clone();
            self.categorize(tx);
        }
        ExtractionResult {
            batch_id,
            transactions,
            strategy,
        }
    }
}

#[async_trait]
impl ChunkExtractor for ExtractionOrchestrator {
    async fn extract_chunk(&self, text: &str, reference: NaiveDate) -> Result<Vec<Transaction>> {
        let (mut found, _) = self.extract_local(text, reference);
        if found.is_empty() {
            if let Some(llm) = self.llm.as_ref() {
                if llm.is_available(text).await {
                    found = llm.extract(text, reference, None).await?;
                }
            }
        }
        for tx in &mut found {
            self.categorize(tx);
        }
        Ok(found)
    }
}
