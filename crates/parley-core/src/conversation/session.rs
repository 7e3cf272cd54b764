//! Session controller
//!
//! A `Session` owns one conversation: its state, the store handle and the
//! router. Turns are strictly sequential; a message that arrives while another
//! is in flight is rejected rather than queued. Bulk imports run as background
//! tasks that post their report into the message log when they finish.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bulk::BulkEvent;
use crate::error::Error;
use crate::models::{ExtractionBatch, Transaction};
use crate::store::TransactionStore;

use super::handlers::{BulkJob, Services};
use super::intent::Intent;
use super::router::TurnRouter;
use super::state::{ClarificationMode, ConversationSnapshot, ConversationState, Speaker};

const BUSY_REPLY: &str = "Still working on your last message, one moment.";

/// What one call to `handle_message` produced
#[derive(Debug)]
pub struct TurnOutcome {
    /// False when the message was rejected by the in-flight guard
    pub accepted: bool,
    pub reply: String,
    pub intent: Option<Intent>,
    /// Transactions added or replaced by this turn
    pub transactions: Vec<Transaction>,
    /// Bulk import started by this turn
    pub background: Option<JoinHandle<()>>,
}

/// Clears the in-flight flag when the turn ends, however it ends
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One conversation; clones share everything
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<ConversationState>>,
    store: Arc<dyn TransactionStore>,
    services: Services,
    router: Arc<TurnRouter>,
    in_flight: Arc<AtomicBool>,
    /// Bumped by `reset`; background work from an older generation is dropped
    generation: Arc<AtomicU64>,
    reference: Option<NaiveDate>,
}

impl Session {
    pub fn new(services: Services, store: Arc<dyn TransactionStore>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConversationState::new())),
            store,
            services,
            router: Arc::new(TurnRouter::new()),
            in_flight: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            reference: None,
        }
    }

    /// Resolve relative dates against a fixed day instead of today
    pub fn with_reference_date(mut self, reference: NaiveDate) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_router(mut self, router: TurnRouter) -> Self {
        self.router = Arc::new(router);
        self
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.store
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Run one user turn
    pub async fn handle_message(&self, message: &str) -> TurnOutcome {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            info!("Rejected message while another is in flight");
            return TurnOutcome {
                accepted: false,
                reply: BUSY_REPLY.to_string(),
                intent: None,
                transactions: Vec::new(),
                background: None,
            };
        };

        let message = message.trim();
        let reference = self.reference_date();
        let max_history = self.services.config.conversation.max_history;

        let mut state = self.state.lock().await;
        state.push_message(Speaker::User, message, max_history);
        let dispatch = self
            .router
            .dispatch(message, &self.services, self.store.as_ref(), reference, &mut state)
            .await;
        state.push_message(Speaker::Assistant, &dispatch.reply, max_history);

        let background = dispatch.bulk_job.map(|job| {
            state.processing = true;
            state.progress = 0;
            self.spawn_bulk(job, reference)
        });

        TurnOutcome {
            accepted: true,
            reply: dispatch.reply,
            intent: dispatch.intent,
            transactions: dispatch.transactions,
            background,
        }
    }

    /// Start a bulk import that reports back through the message log
    fn spawn_bulk(&self, job: BulkJob, reference: NaiveDate) -> JoinHandle<()> {
        let state = self.state.clone();
        let store = self.store.clone();
        let bulk = self.services.bulk.clone();
        let generation = self.generation.clone();
        let launched = generation.load(Ordering::Acquire);
        let conversation = self.services.config.conversation.clone();

        tokio::spawn(async move {
            let (events, mut rx) = mpsc::unbounded_channel::<BulkEvent>();
            let forwarder = {
                let state = state.clone();
                let generation = generation.clone();
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        if generation.load(Ordering::Acquire) != launched {
                            continue;
                        }
                        let mut state = state.lock().await;
                        match event {
                            BulkEvent::Segmented { chunks } => {
                                let percent = state.progress;
                                state.set_progress(percent, &format!("Extracting {} chunk(s)...", chunks));
                            }
                            BulkEvent::Progress {
                                completed,
                                total,
                                percent,
                            } => state.set_progress(
                                percent,
                                &format!("Processed {} of {} chunk(s)", completed, total),
                            ),
                        }
                    }
                })
            };

            let run = match store.list() {
                Ok(existing) => {
                    bulk.run(&job.text, reference, &existing, job.direction_override, Some(&events))
                        .await
                }
                Err(e) => Err(e),
            };
            drop(events);
            let _ = forwarder.await;

            // Holding the state lock keeps `reset` from slipping in before the commit
            let mut state = state.lock().await;
            if generation.load(Ordering::Acquire) != launched {
                info!("Session was reset during bulk import, discarding results");
                return;
            }
            state.processing = false;

            // Dedupe again: turns may have saved transactions while chunks ran
            let committed = run.and_then(|mut report| report.commit(store.as_ref()).map(|()| report));
            let reply = match committed {
                Ok(report) => {
                    state.set_progress(100, "Ready");
                    let mut reply = report.message();
                    if !report.added.is_empty() {
                        state.remember_batch(
                            ExtractionBatch::new(&report.batch_id, &job.text, &report.added),
                            conversation.recent_batches,
                        );
                    }
                    if report.needs_direction {
                        state.enter(ClarificationMode::AwaitingDirection {
                            txn_ids: report.added.iter().map(|t| t.id.clone()).collect(),
                        });
                        reply.push_str(" I couldn't tell whether these were income or expenses. Are they income or expenses?");
                    }
                    info!(
                        added = report.added.len(),
                        duplicates = report.duplicates,
                        errored = report.errored_chunks(),
                        "Bulk import committed"
                    );
                    reply
                }
                Err(e) => {
                    error!(error = %e, "Bulk import failed");
                    state.set_progress(0, "Error");
                    match e {
                        Error::NotFound(_) => {
                            "I couldn't find any transactions to split out of that text.".to_string()
                        }
                        other => format!("Sorry, the import failed: {}", other),
                    }
                }
            };
            state.push_message(Speaker::Assistant, &reply, conversation.max_history);
        })
    }

    /// Start over: fresh state, and any running import is abandoned
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        *state = ConversationState::new();
        info!("Session reset");
    }

    pub async fn snapshot(&self) -> ConversationSnapshot {
        self.state.lock().await.snapshot()
    }
}
