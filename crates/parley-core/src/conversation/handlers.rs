//! Intent handlers
//!
//! A handler turns one classified message into a reply plus the transactions
//! it created or changed. Handlers read the store through `TurnContext` but
//! never write to it: the router persists whatever they return, in one place.
//! Returning `Ok(None)` declines the message so the next candidate can try.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, warn};

use crate::ai::{ChatMessage, ChatOptions, LlmBackend, LlmClient};
use crate::bulk::BulkPipeline;
use crate::categorize::category_for_direction;
use crate::config::PipelineConfig;
use crate::dedupe::dedupe;
use crate::direction::parse_direction_answer;
use crate::error::Result;
use crate::extract::amounts::{find_amounts, parse_loose_amount};
use crate::extract::dates::find_date;
use crate::extract::{ExtractionOrchestrator, LlmExtractor};
use crate::models::{round_cents, Direction, ExtractionBatch, Transaction, TxDate};
use crate::prompts::{PromptId, PromptLibrary};
use crate::store::TransactionStore;

use super::intent::{bulk_override_direction, parse_count};
use super::state::{ClarificationMode, ConversationState, Correction, Mood};

const COUNT_QUESTION: &str = "How many transactions should there be in total?";

/// Pipeline components shared by every turn of a session
#[derive(Clone)]
pub struct Services {
    pub orchestrator: ExtractionOrchestrator,
    pub bulk: Arc<BulkPipeline>,
    pub llm: Option<LlmClient>,
    pub prompts: Arc<Mutex<PromptLibrary>>,
    pub config: PipelineConfig,
}

impl Services {
    pub fn new(llm: Option<LlmClient>, config: PipelineConfig) -> Self {
        Self::with_prompts(llm, config, PromptLibrary::new())
    }

    /// Build every component around one shared prompt library
    pub fn with_prompts(llm: Option<LlmClient>, config: PipelineConfig, prompts: PromptLibrary) -> Self {
        let prompts = Arc::new(Mutex::new(prompts));
        let extractor = llm.clone().map(|client| {
            LlmExtractor::with_prompts(client, prompts.clone(), config.extraction.max_llm_tokens)
        });
        let orchestrator = ExtractionOrchestrator::new(extractor.clone(), &config.extraction);
        let bulk = BulkPipeline::new(Arc::new(orchestrator.clone()), config.bulk.clone())
            .with_segmenter(extractor);
        Self {
            orchestrator,
            bulk: Arc::new(bulk),
            llm,
            prompts,
            config,
        }
    }
}

/// Per-turn context handed to handlers
pub struct TurnContext<'a> {
    pub services: &'a Services,
    /// Date relative phrases are resolved against
    pub reference: NaiveDate,
    store: &'a dyn TransactionStore,
}

impl<'a> TurnContext<'a> {
    pub fn new(services: &'a Services, store: &'a dyn TransactionStore, reference: NaiveDate) -> Self {
        Self {
            services,
            reference,
            store,
        }
    }

    pub fn transactions(&self) -> Result<Vec<Transaction>> {
        self.store.list()
    }

    /// Stored transactions with the given ids, skipping missing ones
    pub fn lookup(&self, ids: &[String]) -> Result<Vec<Transaction>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(tx) = self.store.get(id)? {
                found.push(tx);
            }
        }
        Ok(found)
    }

    fn max_reprompts(&self) -> u32 {
        self.services.config.conversation.max_reprompts
    }

    fn batch_memory(&self) -> usize {
        self.services.config.conversation.recent_batches
    }
}

/// Large paste to run through the bulk pipeline after the turn returns
#[derive(Debug, Clone, PartialEq)]
pub struct BulkJob {
    pub text: String,
    pub direction_override: Option<Direction>,
}

/// What a handler wants said and stored
#[derive(Debug, Clone, Default)]
pub struct HandlerResult {
    pub reply: String,
    pub added: Vec<Transaction>,
    pub updated: Vec<Transaction>,
    /// Status line; "Ready" when unset
    pub status: Option<String>,
    pub bulk_job: Option<BulkJob>,
}

impl HandlerResult {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            ..Default::default()
        }
    }

    pub fn with_added(mut self, added: Vec<Transaction>) -> Self {
        self.added = added;
        self
    }

    pub fn with_updated(mut self, updated: Vec<Transaction>) -> Self {
        self.updated = updated;
        self
    }

    fn append(&mut self, text: &str) {
        if self.reply.is_empty() {
            self.reply = text.to_string();
        } else {
            self.reply.push(' ');
            self.reply.push_str(text);
        }
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle `message`, or return `Ok(None)` to pass it on
    async fn handle(
        &self,
        message: &str,
        ctx: &TurnContext<'_>,
        state: &mut ConversationState,
    ) -> Result<Option<HandlerResult>>;
}

// ==================== Clarification replies ====================

/// Answers to whichever question is pending
pub struct ClarificationHandler;

#[async_trait]
impl Handler for ClarificationHandler {
    async fn handle(
        &self,
        message: &str,
        ctx: &TurnContext<'_>,
        state: &mut ConversationState,
    ) -> Result<Option<HandlerResult>> {
        let result = match state.mode().clone() {
            ClarificationMode::None => return Ok(None),
            ClarificationMode::AwaitingDirection { txn_ids } => {
                resolve_direction(message, ctx, state, &txn_ids)?
            }
            ClarificationMode::AwaitingDuplicateConfirmation { pending, batch_id } => {
                resolve_duplicates(message, ctx, state, pending, &batch_id)?
            }
            ClarificationMode::AwaitingCorrection {
                candidate_ids,
                correction,
            } => resolve_correction(message, ctx, state, &candidate_ids, &correction)?,
            ClarificationMode::AwaitingCountCorrection { last_raw_text } => {
                match parse_count(message) {
                    Some(expected) => {
                        state.clear_mode();
                        reextract(ctx, state, &last_raw_text, expected).await?
                    }
                    None if is_cancel(message) => {
                        state.clear_mode();
                        HandlerResult::reply("Okay, I'll keep what I found.")
                    }
                    None => reprompt(state, ctx, COUNT_QUESTION),
                }
            }
        };
        Ok(Some(result))
    }
}

fn resolve_direction(
    message: &str,
    ctx: &TurnContext<'_>,
    state: &mut ConversationState,
    txn_ids: &[String],
) -> Result<HandlerResult> {
    let targets = ctx.lookup(txn_ids)?;
    if targets.is_empty() {
        state.clear_mode();
        return Ok(HandlerResult::reply(
            "I can't find those transactions anymore, so there's nothing to label.",
        ));
    }

    match parse_direction_answer(message) {
        Some(direction) => {
            state.clear_mode();
            let updated: Vec<Transaction> = targets
                .iter()
                .map(|tx| with_direction(ctx, tx, direction))
                .collect();
            let reply = match updated.as_slice() {
                [one] => format!("Got it, {} is marked as {}.", one.description, direction.label()),
                many => format!("Got it, marked {} transactions as {}.", many.len(), direction.label()),
            };
            Ok(HandlerResult::reply(reply).with_updated(updated))
        }
        None if is_cancel(message) => {
            state.clear_mode();
            Ok(HandlerResult::reply("Okay, I'll leave the direction as unknown for now."))
        }
        None => Ok(reprompt(state, ctx, &direction_question(&targets))),
    }
}

fn resolve_duplicates(
    message: &str,
    ctx: &TurnContext<'_>,
    state: &mut ConversationState,
    pending: Vec<Transaction>,
    batch_id: &str,
) -> Result<HandlerResult> {
    let mut result = if yes_re().is_match(message) {
        state.clear_mode();
        HandlerResult::reply(format!("Added {} duplicate(s) anyway.", pending.len())).with_added(pending)
    } else if no_re().is_match(message) || is_cancel(message) {
        state.clear_mode();
        HandlerResult::reply("Okay, I skipped the duplicate(s).")
    } else {
        return Ok(reprompt(state, ctx, &duplicate_question(&pending)));
    };

    // Unknown directions from the same extraction are asked about next
    let mut unknown: Vec<Transaction> = ctx
        .transactions()?
        .into_iter()
        .filter(|t| t.batch_id == batch_id)
        .collect();
    unknown.extend(result.added.iter().cloned());
    ask_direction(state, &mut result, &unknown);
    Ok(result)
}

fn resolve_correction(
    message: &str,
    ctx: &TurnContext<'_>,
    state: &mut ConversationState,
    candidate_ids: &[String],
    correction: &Correction,
) -> Result<HandlerResult> {
    let candidates = ctx.lookup(candidate_ids)?;
    let chosen = if all_re().is_match(message) {
        candidates.clone()
    } else {
        pick_candidates(message, &candidates)
    };

    if chosen.is_empty() {
        if is_cancel(message) {
            state.clear_mode();
            return Ok(HandlerResult::reply("Okay, I left everything as it was."));
        }
        return Ok(reprompt(state, ctx, &correction_question(&candidates, correction)));
    }

    state.clear_mode();
    let updated: Vec<Transaction> = chosen
        .iter()
        .map(|tx| apply_correction(ctx, tx, correction))
        .collect();
    Ok(HandlerResult::reply(correction_reply(&updated, correction)).with_updated(updated))
}

/// Count an unparsable reply and ask again, or drop the question once
/// `max_reprompts` re-asks have already gone unanswered
fn reprompt(state: &mut ConversationState, ctx: &TurnContext<'_>, question: &str) -> HandlerResult {
    let attempts = state.note_reprompt();
    if attempts > ctx.max_reprompts() {
        debug!(mode = state.mode().name(), attempts, "Dropping unanswered clarification");
        state.clear_mode();
        return HandlerResult::reply(
            "Let's skip that question for now. You can correct it any time.",
        );
    }
    HandlerResult::reply(format!("Sorry, I didn't catch that. {}", question))
}

// ==================== Count mismatch ====================

/// "You missed some", "there should be 4 transactions"
pub struct CountMismatchHandler;

#[async_trait]
impl Handler for CountMismatchHandler {
    async fn handle(
        &self,
        message: &str,
        ctx: &TurnContext<'_>,
        state: &mut ConversationState,
    ) -> Result<Option<HandlerResult>> {
        let Some(raw) = state.last_raw_text().map(str::to_string) else {
            return Ok(None);
        };
        match expected_total(message, state) {
            Some(expected) => Ok(Some(reextract(ctx, state, &raw, expected).await?)),
            None => {
                state.enter(ClarificationMode::AwaitingCountCorrection { last_raw_text: raw });
                Ok(Some(HandlerResult::reply(COUNT_QUESTION)))
            }
        }
    }
}

/// Total the user expects; "missed 2" adds to what the last extraction found
fn expected_total(message: &str, state: &ConversationState) -> Option<usize> {
    static TOTAL: OnceLock<Regex> = OnceLock::new();
    static MISSED: OnceLock<Regex> = OnceLock::new();
    let total = TOTAL.get_or_init(|| {
        Regex::new(r"(?i)\bthere\s+(?:should\s+be|were|are|was)\b").expect("total regex")
    });
    let missed = MISSED.get_or_init(|| {
        Regex::new(r"(?i)\b(?:missed|skipped|forgot|left\s+out)\b").expect("missed regex")
    });

    let n = parse_count(message)?;
    if !total.is_match(message) && missed.is_match(message) {
        let found = state.last_batch().map(|b| b.transaction_ids.len()).unwrap_or(0);
        return Some(found + n);
    }
    Some(n)
}

/// Re-run extraction on the last raw text with a count hint, keeping only new records
async fn reextract(
    ctx: &TurnContext<'_>,
    state: &mut ConversationState,
    raw: &str,
    expected: usize,
) -> Result<HandlerResult> {
    let result = ctx
        .services
        .orchestrator
        .extract_with_hint(raw, ctx.reference, expected)
        .await;
    let outcome = dedupe(&result.transactions, &ctx.transactions()?);
    debug!(
        expected,
        found = result.transactions.len(),
        new = outcome.unique.len(),
        "Count-hinted re-extraction"
    );
    if outcome.unique.is_empty() {
        return Ok(HandlerResult::reply(format!(
            "I looked again for {} transaction(s) but didn't find anything new.",
            expected
        )));
    }

    let added = outcome.unique;
    state.remember_batch(
        ExtractionBatch::new(&result.batch_id, raw, &added),
        ctx.batch_memory(),
    );
    let mut reply = HandlerResult::reply(format!(
        "Found {} more transaction(s):\n{}",
        added.len(),
        numbered(&added)
    ));
    ask_direction(state, &mut reply, &added);
    Ok(reply.with_added(added))
}

// ==================== Bulk direction override ====================

/// "They're all expenses" after an extraction
pub struct BulkOverrideHandler;

#[async_trait]
impl Handler for BulkOverrideHandler {
    async fn handle(
        &self,
        message: &str,
        ctx: &TurnContext<'_>,
        state: &mut ConversationState,
    ) -> Result<Option<HandlerResult>> {
        // A paste that opens with the override belongs to the bulk handler
        if ctx.services.bulk.is_bulk(message) {
            return Ok(None);
        }
        let (Some(direction), Some(batch)) = (bulk_override_direction(message), state.last_batch())
        else {
            return Ok(None);
        };
        let targets = ctx.lookup(&batch.transaction_ids)?;
        if targets.is_empty() {
            return Ok(None);
        }

        let updated: Vec<Transaction> = targets
            .iter()
            .filter(|tx| tx.direction != direction)
            .map(|tx| with_direction(ctx, tx, direction))
            .collect();
        Ok(Some(
            HandlerResult::reply(format!(
                "Done, all {} transaction(s) from your last entry are marked as {}.",
                targets.len(),
                direction.label()
            ))
            .with_updated(updated),
        ))
    }
}

// ==================== Missing details ====================

/// Bare amount or date for a transaction recorded without one
pub struct FillMissingHandler;

#[async_trait]
impl Handler for FillMissingHandler {
    async fn handle(
        &self,
        message: &str,
        ctx: &TurnContext<'_>,
        state: &mut ConversationState,
    ) -> Result<Option<HandlerResult>> {
        let Some(batch) = state.last_batch() else {
            return Ok(None);
        };

        let found_date = find_date(message, ctx.reference);
        let mut rest = message.to_string();
        if let Some(ref m) = found_date {
            rest.replace_range(m.span.clone(), " ");
        }
        let amount = parse_loose_amount(&rest).filter(|v| *v > 0.0);
        let date = found_date.map(|m| m.date);

        let mut updated = Vec::new();
        for tx in ctx.lookup(&batch.transaction_ids)? {
            let mut filled = tx.clone();
            match amount {
                Some(value) if !tx.has_amount() => filled.amount = value,
                _ => {}
            }
            match date {
                Some(day) if !tx.date.is_known() => filled.date = TxDate::Known(day),
                _ => {}
            }
            if filled != tx {
                updated.push(filled);
            }
        }
        if updated.is_empty() {
            return Ok(None);
        }

        let reply = match updated.as_slice() {
            [one] => format!("Thanks, updated: {}.", one.summary()),
            many => format!("Thanks, updated {} transactions:\n{}", many.len(), numbered(many)),
        };
        Ok(Some(HandlerResult::reply(reply).with_updated(updated)))
    }
}

// ==================== Field corrections ====================

/// "It was actually $50", "that was income"
pub struct CorrectionHandler;

#[async_trait]
impl Handler for CorrectionHandler {
    async fn handle(
        &self,
        message: &str,
        ctx: &TurnContext<'_>,
        state: &mut ConversationState,
    ) -> Result<Option<HandlerResult>> {
        let Some(batch) = state.last_batch() else {
            return Ok(None);
        };
        let Some(correction) = parse_correction(message, ctx.reference) else {
            return Ok(None);
        };
        let candidates = ctx.lookup(&batch.transaction_ids)?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let targets = narrow_targets(message, &candidates, &correction);
        if let [target] = targets.as_slice() {
            let updated = vec![apply_correction(ctx, target, &correction)];
            return Ok(Some(
                HandlerResult::reply(correction_reply(&updated, &correction)).with_updated(updated),
            ));
        }

        let question = correction_question(&candidates, &correction);
        state.enter(ClarificationMode::AwaitingCorrection {
            candidate_ids: candidates.iter().map(|t| t.id.clone()).collect(),
            correction,
        });
        Ok(Some(HandlerResult::reply(question)))
    }
}

/// The new value a correction names: amount, then date, then direction
fn parse_correction(message: &str, reference: NaiveDate) -> Option<Correction> {
    // "not $20, it's $25": the last amount is the new one
    if let Some(m) = find_amounts(message).last() {
        return Some(Correction::Amount(m.value));
    }
    if let Some(m) = find_date(message, reference) {
        return Some(Correction::Date(m.date));
    }
    if let Some(direction) = parse_direction_answer(message) {
        return Some(Correction::Direction(direction));
    }
    parse_loose_amount(message)
        .filter(|v| *v > 0.0)
        .map(Correction::Amount)
}

/// Candidates the correction plausibly targets
fn narrow_targets(message: &str, candidates: &[Transaction], correction: &Correction) -> Vec<Transaction> {
    if candidates.len() == 1 {
        return candidates.to_vec();
    }
    let named = pick_candidates(message, candidates);
    if named.len() == 1 {
        return named;
    }
    if let Correction::Direction(_) = correction {
        let unknown: Vec<Transaction> = candidates
            .iter()
            .filter(|t| t.direction == Direction::Unknown)
            .cloned()
            .collect();
        if unknown.len() == 1 {
            return unknown;
        }
    }
    candidates.to_vec()
}

fn apply_correction(ctx: &TurnContext<'_>, tx: &Transaction, correction: &Correction) -> Transaction {
    match correction {
        Correction::Amount(value) => Transaction {
            amount: round_cents(*value),
            ..tx.clone()
        },
        Correction::Date(date) => Transaction {
            date: TxDate::Known(*date),
            ..tx.clone()
        },
        Correction::Direction(direction) => with_direction(ctx, tx, *direction),
    }
}

fn correction_reply(updated: &[Transaction], correction: &Correction) -> String {
    match updated {
        [one] => format!(
            "Updated the {} of {} to {}.",
            correction.field(),
            one.description,
            correction.describe()
        ),
        many => format!(
            "Updated the {} of {} transactions to {}.",
            correction.field(),
            many.len(),
            correction.describe()
        ),
    }
}

fn correction_question(candidates: &[Transaction], correction: &Correction) -> String {
    format!(
        "Which transaction should get the {} {}?\n{}\nReply with a number or a name.",
        correction.field(),
        correction.describe(),
        numbered(candidates)
    )
}

// ==================== Extraction ====================

/// Large paste: hand off to the background bulk pipeline
pub struct BulkExtractionHandler;

#[async_trait]
impl Handler for BulkExtractionHandler {
    async fn handle(
        &self,
        message: &str,
        _ctx: &TurnContext<'_>,
        state: &mut ConversationState,
    ) -> Result<Option<HandlerResult>> {
        if state.processing {
            return Ok(Some(HandlerResult::reply(
                "I'm still working through your last import. I'll post the results when it's done.",
            )));
        }
        Ok(Some(HandlerResult {
            reply: "That looks like a statement. I'm splitting it up and will report back when it's done."
                .to_string(),
            status: Some("Segmenting statement...".to_string()),
            bulk_job: Some(BulkJob {
                text: message.to_string(),
                direction_override: bulk_override_direction(message),
            }),
            ..Default::default()
        }))
    }
}

/// Single message with one or more transactions in it
pub struct ExtractionHandler;

#[async_trait]
impl Handler for ExtractionHandler {
    async fn handle(
        &self,
        message: &str,
        ctx: &TurnContext<'_>,
        state: &mut ConversationState,
    ) -> Result<Option<HandlerResult>> {
        let result = ctx.services.orchestrator.extract(message, ctx.reference).await;
        if result.is_empty() {
            return Ok(Some(HandlerResult::reply(
                "I couldn't find a transaction in that. Try something like \"I spent $20 at Target yesterday\".",
            )));
        }

        let outcome = dedupe(&result.transactions, &ctx.transactions()?);
        state.remember_batch(result.to_batch(message), ctx.batch_memory());

        let mut reply = match outcome.unique.as_slice() {
            [] => HandlerResult::default(),
            [one] => HandlerResult::reply(format!("Got it: {}.", one.summary())),
            many => HandlerResult::reply(format!(
                "Got it, I recorded {} transactions:\n{}",
                many.len(),
                numbered(many)
            )),
        };

        // Duplicates are confirmed before directions are asked about
        if outcome.duplicates.is_empty() {
            ask_direction(state, &mut reply, &outcome.unique);
        } else {
            reply.append(&duplicate_question(&outcome.duplicates));
            state.enter(ClarificationMode::AwaitingDuplicateConfirmation {
                pending: outcome.duplicates,
                batch_id: result.batch_id.clone(),
            });
        }
        Ok(Some(reply.with_added(outcome.unique)))
    }
}

// ==================== Small talk and fallback ====================

pub struct SmallTalkHandler;

#[async_trait]
impl Handler for SmallTalkHandler {
    async fn handle(
        &self,
        message: &str,
        _ctx: &TurnContext<'_>,
        state: &mut ConversationState,
    ) -> Result<Option<HandlerResult>> {
        static THANKS: OnceLock<Regex> = OnceLock::new();
        static GREETING: OnceLock<Regex> = OnceLock::new();
        let thanks = THANKS.get_or_init(|| {
            Regex::new(r"(?i)\b(?:thanks?|thank\s+you|thx|cheers)\b").expect("thanks regex")
        });
        let greeting = GREETING.get_or_init(|| {
            Regex::new(r"(?i)^\s*(?:hi|hello|hey|yo|good\s+(?:morning|afternoon|evening))\b|\bhow\s+are\s+you\b")
                .expect("greeting regex")
        });

        let reply = if thanks.is_match(message) {
            "You're welcome! Tell me about another transaction whenever you like."
        } else if greeting.is_match(message) {
            "Hi! Tell me about money you spent or received, or paste a bank statement."
        } else {
            match state.mood {
                Mood::Frustrated => "Sorry this is being a pain. Tell me what looks wrong and I'll fix it.",
                Mood::Stressed => "Money can be stressful. Let's take it one transaction at a time.",
                Mood::Positive => "Glad to hear it! Anything else to record?",
                Mood::Neutral => "I'm here whenever you want to record a transaction.",
            }
        };
        Ok(Some(HandlerResult::reply(reply)))
    }
}

/// Model-written reply, canned text when the model is missing or fails
pub struct FallbackHandler;

impl FallbackHandler {
    async fn model_reply(&self, message: &str, ctx: &TurnContext<'_>, mood: Mood) -> Option<String> {
        let llm = ctx.services.llm.as_ref()?;
        let prompt = {
            let mut prompts = ctx.services.prompts.lock().ok()?;
            let mut vars = HashMap::new();
            vars.insert("message", message);
            if mood != Mood::Neutral {
                vars.insert("mood", mood.as_str());
            }
            match prompts.render(PromptId::AssistantReply, &vars) {
                Ok(prompt) => prompt,
                Err(e) => {
                    warn!(error = %e, "Failed to render assistant prompt");
                    return None;
                }
            }
        };

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = prompt.system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt.user));

        match llm.chat(&messages, &ChatOptions::for_task(prompt.task)).await {
            Ok(reply) if !reply.trim().is_empty() => Some(reply.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Assistant reply failed, using canned reply");
                None
            }
        }
    }
}

#[async_trait]
impl Handler for FallbackHandler {
    async fn handle(
        &self,
        message: &str,
        ctx: &TurnContext<'_>,
        state: &mut ConversationState,
    ) -> Result<Option<HandlerResult>> {
        let reply = match self.model_reply(message, ctx, state.mood).await {
            Some(reply) => reply,
            None => "I can help you keep track of money in and out. Try something like \"I spent $20 at Target yesterday\"."
                .to_string(),
        };
        Ok(Some(HandlerResult::reply(reply)))
    }
}

// ==================== Shared helpers ====================

fn with_direction(ctx: &TurnContext<'_>, tx: &Transaction, direction: Direction) -> Transaction {
    let classifier = ctx.services.orchestrator.classifier();
    Transaction {
        direction,
        category: category_for_direction(
            classifier,
            tx.category,
            direction,
            &tx.description,
            &tx.payment_type,
        ),
        ..tx.clone()
    }
}

/// Enter AwaitingDirection for any unknown-direction transactions in `txs`
fn ask_direction(state: &mut ConversationState, result: &mut HandlerResult, txs: &[Transaction]) {
    let unknown: Vec<Transaction> = txs
        .iter()
        .filter(|t| t.direction == Direction::Unknown)
        .cloned()
        .collect();
    if unknown.is_empty() {
        return;
    }
    result.append(&direction_question(&unknown));
    state.enter(ClarificationMode::AwaitingDirection {
        txn_ids: unknown.into_iter().map(|t| t.id).collect(),
    });
}

fn direction_question(txs: &[Transaction]) -> String {
    match txs {
        [one] => format!("Was {} income or an expense?", one.summary()),
        many => format!(
            "I couldn't tell whether these were income or expenses:\n{}\nAre they income or expenses?",
            numbered(many)
        ),
    }
}

fn duplicate_question(pending: &[Transaction]) -> String {
    match pending {
        [one] => format!(
            "{} looks like one you already told me about. Add it again anyway?",
            one.summary()
        ),
        many => format!(
            "{} of these look like ones you already told me about:\n{}\nAdd them anyway?",
            many.len(),
            numbered(many)
        ),
    }
}

fn numbered(txs: &[Transaction]) -> String {
    txs.iter()
        .enumerate()
        .map(|(i, tx)| format!("{}. {}", i + 1, tx.summary()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Candidates chosen by position ("2", "the second one") or by name
fn pick_candidates(message: &str, candidates: &[Transaction]) -> Vec<Transaction> {
    if let Some(index) = ordinal(message, candidates.len()) {
        return candidates.get(index).cloned().into_iter().collect();
    }

    const IGNORED: &[&str] = &["the", "and", "one", "was", "for", "that", "this", "with", "from"];
    let lowered = message.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3 && !IGNORED.contains(w))
        .collect();
    candidates
        .iter()
        .filter(|tx| {
            let description = tx.description.to_lowercase();
            description
                .split(|c: char| !c.is_alphanumeric())
                .any(|d| words.contains(&d))
        })
        .cloned()
        .collect()
}

/// Zero-based position named in a reply
fn ordinal(message: &str, len: usize) -> Option<usize> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:the\s+)?(?:#|number\s+)?(\d{1,2}|first|second|third|fourth|fifth|last|1st|2nd|3rd|4th|5th)\b")
            .expect("ordinal regex")
    });
    let word = re.captures(message)?.get(1)?.as_str().to_lowercase();
    let position = match word.as_str() {
        "first" | "1st" => 1,
        "second" | "2nd" => 2,
        "third" | "3rd" => 3,
        "fourth" | "4th" => 4,
        "fifth" | "5th" => 5,
        "last" => len,
        digits => digits.parse().ok()?,
    };
    (1..=len).contains(&position).then(|| position - 1)
}

fn is_cancel(message: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:cancel|no|nope|neither|never\s*mind|forget\s+it|skip(?:\s+it)?)\b")
            .expect("cancel regex")
    })
    .is_match(message)
}

fn yes_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:y|yes|yeah|yep|sure|ok(?:ay)?|please\s+do|do\s+it|add\s+(?:it|them)|keep\s+(?:it|them))\b")
            .expect("yes regex")
    })
}

fn no_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:n|no|nope|don'?t|do\s+not|skip|discard|leave\s+(?:it|them))\b")
            .expect("no regex")
    })
}

fn all_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:all|both|every(?:one|thing)?|each)\b").expect("all regex"))
}
