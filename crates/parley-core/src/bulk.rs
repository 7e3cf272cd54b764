//! Bulk chunker and batch scheduler
//!
//! Large pastes are split into chunks of whole transactions, then extracted a
//! batch at a time. Chunks in a batch run concurrently; the next batch starts
//! only after every chunk of the current one has resolved. A failing or slow
//! chunk is recorded against that chunk alone.

use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::categorize::{category_for_direction, CategoryClassifier, KeywordClassifier};
use crate::config::BulkConfig;
use crate::dedupe::dedupe;
use crate::error::{Error, Result};
use crate::extract::statement::find_blocks;
use crate::extract::{amounts, ChunkExtractor, LlmExtractor};
use crate::models::{new_id, Chunk, ChunkStatus, Direction, Transaction};
use crate::store::TransactionStore;

/// Progress notifications from a running pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum BulkEvent {
    Segmented { chunks: usize },
    Progress {
        completed: usize,
        total: usize,
        percent: u8,
    },
}

/// Outcome of one bulk run
#[derive(Debug, Clone)]
pub struct BulkReport {
    pub batch_id: String,
    pub chunks: Vec<Chunk>,
    /// New transactions, deduplicated against the store and each other
    pub added: Vec<Transaction>,
    pub duplicates: usize,
    /// True when every added transaction has an unknown direction and no
    /// override was given
    pub needs_direction: bool,
}

impl BulkReport {
    pub fn errored_chunks(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Error)
            .count()
    }

    /// Commit `added` into `store`, skipping anything saved since the run began
    ///
    /// Transactions that became duplicates in the meantime move to the
    /// duplicate count.
    pub fn commit(&mut self, store: &dyn TransactionStore) -> Result<()> {
        let outcome = dedupe(&self.added, &store.list()?);
        if outcome.duplicate_count() > 0 {
            debug!(
                dropped = outcome.duplicate_count(),
                "Dropping transactions committed during the run"
            );
        }
        self.duplicates += outcome.duplicate_count();
        self.added = outcome.unique;
        self.needs_direction = self.needs_direction && !self.added.is_empty();
        store.add(&self.added)
    }

    /// User-facing summary
    pub fn message(&self) -> String {
        let mut parts = vec![format!("Added {} new transaction(s).", self.added.len())];
        if self.duplicates > 0 {
            parts.push(format!("Ignored {} duplicate(s).", self.duplicates));
        }
        let errored = self.errored_chunks();
        if errored > 0 {
            parts.push(format!(
                "{} of {} chunk(s) could not be processed.",
                errored,
                self.chunks.len()
            ));
        }
        parts.join(" ")
    }
}

/// Map completed/total into the reserved progress band
pub fn band_percent(completed: usize, total: usize, start: u8, end: u8) -> u8 {
    if total == 0 {
        return end;
    }
    let span = end.saturating_sub(start) as usize;
    let done = completed.min(total);
    start + (span * done / total) as u8
}

/// Segments bulk text and schedules chunk extraction
#[derive(Clone)]
pub struct BulkPipeline {
    extractor: Arc<dyn ChunkExtractor>,
    segmenter: Option<LlmExtractor>,
    classifier: Arc<dyn CategoryClassifier>,
    config: BulkConfig,
}

impl BulkPipeline {
    pub fn new(extractor: Arc<dyn ChunkExtractor>, config: BulkConfig) -> Self {
        Self {
            extractor,
            segmenter: None,
            classifier: Arc::new(KeywordClassifier::new()),
            config,
        }
    }

    /// Use the model for segmentation before falling back to local blocks
    pub fn with_segmenter(mut self, segmenter: Option<LlmExtractor>) -> Self {
        self.segmenter = segmenter;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn CategoryClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// Whether `text` is large enough for the bulk path
    pub fn is_bulk(&self, text: &str) -> bool {
        text.chars().count() > self.config.threshold_chars
    }

    /// Split `text` into chunk texts
    ///
    /// One model call when a segmenter is configured and healthy; local
    /// statement blocks (or blank-line paragraphs with an amount) otherwise.
    pub async fn segment(&self, text: &str, reference: NaiveDate) -> Vec<String> {
        if let Some(segmenter) = self.segmenter.as_ref() {
            if segmenter.is_available(text).await {
                match segmenter.segment(text).await {
                    Ok(chunks) if !chunks.is_empty() => {
                        debug!(chunks = chunks.len(), "Model segmentation");
                        return chunks;
                    }
                    Ok(_) => warn!("Model segmentation returned no chunks, using local blocks"),
                    Err(e) => warn!(error = %e, "Model segmentation failed, using local blocks"),
                }
            }
        }
        local_segments(text, reference)
    }

    /// Segment, extract and deduplicate without committing
    ///
    /// `existing` is the committed store content used for deduplication.
    pub async fn run(
        &self,
        text: &str,
        reference: NaiveDate,
        existing: &[Transaction],
        direction_override: Option<Direction>,
        progress: Option<&UnboundedSender<BulkEvent>>,
    ) -> Result<BulkReport> {
        let texts = self.segment(text, reference).await;
        if texts.is_empty() {
            return Err(Error::NotFound(
                "no transactions found to split into chunks".into(),
            ));
        }

        let total = texts.len();
        info!(chunks = total, batch_size = self.config.batch_size, "Bulk extraction started");
        notify(progress, BulkEvent::Segmented { chunks: total });
        notify(
            progress,
            BulkEvent::Progress {
                completed: 0,
                total,
                percent: self.config.progress_start,
            },
        );

        let mut chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| Chunk::new(index, text))
            .collect();

        let batch_size = self.config.batch_size.max(1);
        let mut completed = 0;
        for (batch_index, batch) in chunks.chunks_mut(batch_size).enumerate() {
            if batch_index > 0 && !self.config.batch_pause.is_zero() {
                tokio::time::sleep(self.config.batch_pause).await;
            }
            for chunk in batch.iter_mut() {
                chunk.status = ChunkStatus::Processing;
            }

            let results = join_all(
                batch
                    .iter()
                    .map(|chunk| self.extract_one(chunk.index, &chunk.text, reference)),
            )
            .await;

            for (chunk, result) in batch.iter_mut().zip(results) {
                match result {
                    Ok(transactions) => {
                        chunk.status = ChunkStatus::Success;
                        chunk.transactions = transactions;
                    }
                    Err(e) => {
                        chunk.status = ChunkStatus::Error;
                        chunk.error = Some(e.to_string());
                    }
                }
            }

            completed += batch.len();
            notify(
                progress,
                BulkEvent::Progress {
                    completed,
                    total,
                    percent: band_percent(
                        completed,
                        total,
                        self.config.progress_start,
                        self.config.progress_end,
                    ),
                },
            );
        }

        let batch_id = new_id();
        let mut aggregate: Vec<Transaction> = chunks
            .iter()
            .flat_map(|c| c.transactions.iter().cloned())
            .collect();
        for tx in &mut aggregate {
            tx.batch_id = batch_id.clone();
            if let Some(direction) = direction_override {
                self.apply_direction(tx, direction);
            }
        }

        let outcome = dedupe(&aggregate, existing);
        let needs_direction = direction_override.is_none()
            && !outcome.unique.is_empty()
            && outcome.unique.iter().all(|t| t.direction == Direction::Unknown);

        let report = BulkReport {
            batch_id,
            chunks,
            duplicates: outcome.duplicate_count(),
            added: outcome.unique,
            needs_direction,
        };
        info!(
            added = report.added.len(),
            duplicates = report.duplicates,
            errored = report.errored_chunks(),
            "Bulk extraction finished"
        );
        Ok(report)
    }

    /// `run` followed by a commit of the new transactions
    pub async fn run_and_commit(
        &self,
        text: &str,
        reference: NaiveDate,
        store: &dyn TransactionStore,
        direction_override: Option<Direction>,
        progress: Option<&UnboundedSender<BulkEvent>>,
    ) -> Result<BulkReport> {
        let existing = store.list()?;
        let mut report = self
            .run(text, reference, &existing, direction_override, progress)
            .await?;
        report.commit(store)?;
        Ok(report)
    }

    async fn extract_one(
        &self,
        index: usize,
        text: &str,
        reference: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let timeout = self.config.chunk_timeout;
        match tokio::time::timeout(timeout, self.extractor.extract_chunk(text, reference)).await {
            Ok(Ok(transactions)) => {
                debug!(chunk = index, count = transactions.len(), "Chunk extracted");
                Ok(transactions)
            }
            Ok(Err(e)) => {
                warn!(chunk = index, error = %e, "Chunk extraction failed");
                Err(e)
            }
            Err(_) => {
                warn!(chunk = index, timeout_secs = timeout.as_secs(), "Chunk extraction timed out");
                Err(Error::Timeout(timeout.as_secs()))
            }
        }
    }

    fn apply_direction(&self, tx: &mut Transaction, direction: Direction) {
        tx.direction = direction;
        tx.category = category_for_direction(
            self.classifier.as_ref(),
            tx.category,
            direction,
            &tx.description,
            &tx.payment_type,
        );
    }
}

fn notify(progress: Option<&UnboundedSender<BulkEvent>>, event: BulkEvent) {
    if let Some(tx) = progress {
        // A dropped receiver only means nobody is watching
        let _ = tx.send(event);
    }
}

/// Statement blocks, or blank-line paragraphs that carry an amount
fn local_segments(text: &str, reference: NaiveDate) -> Vec<String> {
    let blocks = find_blocks(text, reference);
    if !blocks.is_empty() {
        return blocks.iter().map(|b| b.text()).collect();
    }
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty() && amounts::has_amount_pattern(p))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::extract::ExtractionOrchestrator;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 14).unwrap()
    }

    fn fast_config() -> BulkConfig {
        BulkConfig {
            batch_pause: Duration::ZERO,
            ..PipelineConfig::default().bulk
        }
    }

    fn statement(n: usize) -> String {
        (1..=n)
            .map(|i| format!("04/{:02}/2025 MERCHANT NUMBER {} -${}.00", i, i, i * 10))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Fails chunk 2 (the third chunk), echoes the rest
    struct FlakyExtractor;

    #[async_trait]
    impl ChunkExtractor for FlakyExtractor {
        async fn extract_chunk(&self, text: &str, reference: NaiveDate) -> Result<Vec<Transaction>> {
            if text.contains("NUMBER 3 ") {
                return Err(Error::Unavailable("backend went away".into()));
            }
            Ok(crate::extract::statement::extract_statement(text, reference))
        }
    }

    struct SlowExtractor;

    #[async_trait]
    impl ChunkExtractor for SlowExtractor {
        async fn extract_chunk(&self, text: &str, reference: NaiveDate) -> Result<Vec<Transaction>> {
            if text.contains("NUMBER 1 ") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(crate::extract::statement::extract_statement(text, reference))
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Edge {
        Start(usize),
        Finish(usize),
    }

    /// Records when each chunk starts and finishes and the peak concurrency
    #[derive(Default)]
    struct TrackingExtractor {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        log: Mutex<Vec<Edge>>,
    }

    impl TrackingExtractor {
        fn chunk_number(text: &str) -> usize {
            text.split_whitespace()
                .skip_while(|w| *w != "NUMBER")
                .nth(1)
                .and_then(|n| n.parse().ok())
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl ChunkExtractor for TrackingExtractor {
        async fn extract_chunk(&self, text: &str, reference: NaiveDate) -> Result<Vec<Transaction>> {
            let number = Self::chunk_number(text);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.log.lock().unwrap().push(Edge::Start(number));

            // Later chunks finish first so completion order differs from start order
            tokio::time::sleep(Duration::from_millis(60 - 5 * number as u64)).await;

            self.log.lock().unwrap().push(Edge::Finish(number));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(crate::extract::statement::extract_statement(text, reference))
        }
    }

    #[tokio::test]
    async fn test_batches_are_bounded_and_sequential() {
        let tracker = Arc::new(TrackingExtractor::default());
        let config = BulkConfig {
            batch_size: 3,
            ..fast_config()
        };
        let pipeline = BulkPipeline::new(tracker.clone(), config);

        let report = pipeline
            .run(&statement(8), reference(), &[], None, None)
            .await
            .unwrap();
        assert_eq!(report.added.len(), 8);

        assert!(tracker.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(tracker.max_in_flight.load(Ordering::SeqCst), 3);

        let log = tracker.log.lock().unwrap().clone();
        let batch_of = |n: usize| (n - 1) / 3;
        for batch in 0..2 {
            let last_finish = log
                .iter()
                .rposition(|e| matches!(e, Edge::Finish(n) if batch_of(*n) == batch))
                .unwrap();
            let first_next_start = log
                .iter()
                .position(|e| matches!(e, Edge::Start(n) if batch_of(*n) == batch + 1))
                .unwrap();
            assert!(
                last_finish < first_next_start,
                "batch {} started before batch {} finished: {:?}",
                batch + 1,
                batch,
                log
            );
        }
    }

    #[tokio::test]
    async fn test_commit_rechecks_the_store() {
        let orchestrator = ExtractionOrchestrator::local_only(&PipelineConfig::default().extraction);
        let pipeline = BulkPipeline::new(Arc::new(orchestrator), fast_config());
        let store = InMemoryStore::new();

        let mut report = pipeline
            .run(&statement(3), reference(), &[], None, None)
            .await
            .unwrap();
        assert_eq!(report.added.len(), 3);

        // Saved by someone else after the run read the store
        store.add(&report.added[..1]).unwrap();

        report.commit(&store).unwrap();
        assert_eq!(report.added.len(), 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(store.len(), 3);
        assert_eq!(
            report.message(),
            "Added 2 new transaction(s). Ignored 1 duplicate(s)."
        );
    }

    #[tokio::test]
    async fn test_failed_chunk_is_isolated() {
        let pipeline = BulkPipeline::new(Arc::new(FlakyExtractor), fast_config());
        let report = pipeline
            .run(&statement(5), reference(), &[], None, None)
            .await
            .unwrap();

        assert_eq!(report.chunks.len(), 5);
        assert_eq!(report.chunks[2].status, ChunkStatus::Error);
        assert!(report.chunks[2].error.is_some());
        for i in [0, 1, 3, 4] {
            assert_eq!(report.chunks[i].status, ChunkStatus::Success);
        }
        assert_eq!(report.added.len(), 4);
        assert_eq!(report.errored_chunks(), 1);
        assert!(report.message().contains("1 of 5 chunk(s) could not be processed"));
    }

    #[tokio::test]
    async fn test_chunk_timeout_is_a_chunk_failure() {
        let config = BulkConfig {
            chunk_timeout: Duration::from_millis(50),
            ..fast_config()
        };
        let pipeline = BulkPipeline::new(Arc::new(SlowExtractor), config);
        let report = pipeline
            .run(&statement(3), reference(), &[], None, None)
            .await
            .unwrap();
        assert_eq!(report.chunks[0].status, ChunkStatus::Error);
        assert_eq!(report.added.len(), 2);
    }

    #[tokio::test]
    async fn test_batches_report_progress_in_band() {
        let orchestrator = ExtractionOrchestrator::local_only(&PipelineConfig::default().extraction);
        let pipeline = BulkPipeline::new(Arc::new(orchestrator), fast_config());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let report = pipeline
            .run(&statement(10), reference(), &[], None, Some(&tx))
            .await
            .unwrap();
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events[0], BulkEvent::Segmented { chunks: 10 });
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                BulkEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        // Start, after batch 1, after batch 2
        assert_eq!(percents, vec![10, 50, 90]);
        assert_eq!(report.message(), "Added 10 new transaction(s).");
    }

    #[tokio::test]
    async fn test_resubmission_reports_duplicates() {
        let orchestrator = ExtractionOrchestrator::local_only(&PipelineConfig::default().extraction);
        let pipeline = BulkPipeline::new(Arc::new(orchestrator), fast_config());
        let store = InMemoryStore::new();

        let first = pipeline
            .run_and_commit(&statement(10), reference(), &store, None, None)
            .await
            .unwrap();
        assert_eq!(first.added.len(), 10);

        let second = pipeline
            .run_and_commit(&statement(10), reference(), &store, None, None)
            .await
            .unwrap();
        assert_eq!(second.added.len(), 0);
        assert_eq!(second.duplicates, 10);
        assert!(second.message().contains("Ignored 10 duplicate(s)"));
        assert_eq!(store.len(), 10);
    }

    #[tokio::test]
    async fn test_all_unknown_needs_direction_unless_overridden() {
        let orchestrator = ExtractionOrchestrator::local_only(&PipelineConfig::default().extraction);
        let pipeline = BulkPipeline::new(Arc::new(orchestrator), fast_config());
        let text = "04/01/2025 CORNER CAFE $6.50\n04/02/2025 BOOK NOOK $12.00";

        let report = pipeline.run(text, reference(), &[], None, None).await.unwrap();
        assert!(report.needs_direction);

        let report = pipeline
            .run(text, reference(), &[], Some(Direction::Out), None)
            .await
            .unwrap();
        assert!(!report.needs_direction);
        assert!(report.added.iter().all(|t| t.direction == Direction::Out));
    }

    #[tokio::test]
    async fn test_nothing_to_segment_fails_before_extraction() {
        let pipeline = BulkPipeline::new(Arc::new(FlakyExtractor), fast_config());
        let err = pipeline
            .run("just some words\n\nmore words", reference(), &[], None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_band_percent() {
        assert_eq!(band_percent(0, 4, 10, 90), 10);
        assert_eq!(band_percent(2, 4, 10, 90), 50);
        assert_eq!(band_percent(4, 4, 10, 90), 90);
        assert_eq!(band_percent(0, 0, 10, 90), 90);
    }
}
