//! Turn router
//!
//! Classifies a message once, then offers it to the handlers of the matching
//! intents in priority order. The first handler that claims the message wins.
//! Every dispatch runs inside the same wrapper: mood tracking, timing and
//! logging, the single persistence step, and error recovery that restores the
//! clarification mode the turn started with.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::models::Transaction;
use crate::store::TransactionStore;

use super::handlers::{
    BulkExtractionHandler, BulkJob, BulkOverrideHandler, ClarificationHandler, CorrectionHandler,
    CountMismatchHandler, ExtractionHandler, FallbackHandler, FillMissingHandler, Handler,
    HandlerResult, Services, SmallTalkHandler, TurnContext,
};
use super::intent::{detect_mood, Intent};
use super::state::ConversationState;

const ERROR_REPLY: &str = "Sorry, something went wrong on my side. Please try that again.";

/// Result of one routed turn
#[derive(Debug, Clone, Default)]
pub struct Dispatch {
    pub handled: bool,
    pub intent: Option<Intent>,
    pub reply: String,
    /// Transactions added or replaced by this turn
    pub transactions: Vec<Transaction>,
    pub bulk_job: Option<BulkJob>,
    /// Set when the handler or the persistence step failed
    pub error: Option<String>,
}

/// Lookup table from intent to handler
pub struct TurnRouter {
    handlers: HashMap<Intent, Arc<dyn Handler>>,
}

impl Default for TurnRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnRouter {
    pub fn new() -> Self {
        let mut handlers: HashMap<Intent, Arc<dyn Handler>> = HashMap::new();
        handlers.insert(Intent::ClarificationReply, Arc::new(ClarificationHandler));
        handlers.insert(Intent::CountMismatch, Arc::new(CountMismatchHandler));
        handlers.insert(Intent::BulkDirectionOverride, Arc::new(BulkOverrideHandler));
        handlers.insert(Intent::FillMissingDetail, Arc::new(FillMissingHandler));
        handlers.insert(Intent::FieldCorrection, Arc::new(CorrectionHandler));
        handlers.insert(Intent::BulkExtraction, Arc::new(BulkExtractionHandler));
        handlers.insert(Intent::Extraction, Arc::new(ExtractionHandler));
        handlers.insert(Intent::SmallTalk, Arc::new(SmallTalkHandler));
        handlers.insert(Intent::Fallback, Arc::new(FallbackHandler));
        Self { handlers }
    }

    /// Replace the handler for one intent
    pub fn with_handler(mut self, intent: Intent, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(intent, handler);
        self
    }

    /// Route one message and persist whatever the winning handler returns
    pub async fn dispatch(
        &self,
        message: &str,
        services: &Services,
        store: &dyn TransactionStore,
        reference: NaiveDate,
        state: &mut ConversationState,
    ) -> Dispatch {
        let started = Instant::now();
        if let Some(mood) = detect_mood(message) {
            state.mood = mood;
        }

        let candidates = Intent::candidates(message, state, services.config.bulk.threshold_chars);
        debug!(?candidates, mode = state.mode().name(), "Classified message");

        let ctx = TurnContext::new(services, store, reference);
        let saved = state.save_clarification();

        for intent in candidates {
            let Some(handler) = self.handlers.get(&intent) else {
                continue;
            };
            let outcome = match handler.handle(message, &ctx, state).await {
                Ok(None) => {
                    debug!(intent = intent.as_str(), "Handler declined");
                    continue;
                }
                Ok(Some(result)) => persist(store, &result).map(|()| result),
                Err(e) => Err(e),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            return match outcome {
                Ok(result) => {
                    info!(
                        intent = intent.as_str(),
                        elapsed_ms,
                        added = result.added.len(),
                        updated = result.updated.len(),
                        mode = state.mode().name(),
                        "Turn handled"
                    );
                    state.status = result.status.unwrap_or_else(|| "Ready".to_string());
                    let mut transactions = result.added;
                    transactions.extend(result.updated);
                    Dispatch {
                        handled: true,
                        intent: Some(intent),
                        reply: result.reply,
                        transactions,
                        bulk_job: result.bulk_job,
                        error: None,
                    }
                }
                Err(e) => {
                    error!(intent = intent.as_str(), elapsed_ms, error = %e, "Handler failed");
                    // No half-set clarification survives a failed turn
                    state.restore_clarification(saved);
                    state.status = "Error".to_string();
                    Dispatch {
                        handled: true,
                        intent: Some(intent),
                        reply: ERROR_REPLY.to_string(),
                        error: Some(e.to_string()),
                        ..Default::default()
                    }
                }
            };
        }

        debug!("No handler claimed the message");
        Dispatch {
            reply: ERROR_REPLY.to_string(),
            ..Default::default()
        }
    }
}

/// The one place handler results reach the store
fn persist(store: &dyn TransactionStore, result: &HandlerResult) -> Result<()> {
    if !result.added.is_empty() {
        store.add(&result.added)?;
    }
    for tx in &result.updated {
        store.update(tx)?;
    }
    Ok(())
}
