//! Conversation state and the clarification state machine
//!
//! At most one clarification is pending at a time. The pending question is a
//! single `ClarificationMode` value, so entering a new mode replaces the old
//! one along with its payload.

use std::collections::VecDeque;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::models::{Direction, ExtractionBatch, Transaction};

/// Who wrote a log message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub speaker: Speaker,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Rough emotional register of the user, used to pick a reply tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Neutral,
    Positive,
    Frustrated,
    Stressed,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Positive => "positive",
            Self::Frustrated => "frustrated",
            Self::Stressed => "stressed",
        }
    }
}

/// A field-level correction waiting for its target
#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    Amount(f64),
    Date(NaiveDate),
    Direction(Direction),
}

impl Correction {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Amount(_) => "amount",
            Self::Date(_) => "date",
            Self::Direction(_) => "direction",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Amount(v) => format!("${:.2}", v),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Direction(d) => d.label().to_string(),
        }
    }
}

/// The single pending clarification
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ClarificationMode {
    #[default]
    None,
    AwaitingDirection {
        txn_ids: Vec<String>,
    },
    AwaitingDuplicateConfirmation {
        pending: Vec<Transaction>,
        /// Batch whose unknown directions are asked about once this resolves
        batch_id: String,
    },
    AwaitingCorrection {
        candidate_ids: Vec<String>,
        correction: Correction,
    },
    AwaitingCountCorrection {
        last_raw_text: String,
    },
}

impl ClarificationMode {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::AwaitingDirection { .. } => "awaiting_direction",
            Self::AwaitingDuplicateConfirmation { .. } => "awaiting_duplicate_confirmation",
            Self::AwaitingCorrection { .. } => "awaiting_correction",
            Self::AwaitingCountCorrection { .. } => "awaiting_count_correction",
        }
    }
}

/// A clarification mode captured with its reprompt count
#[derive(Debug, Clone)]
pub struct SavedClarification {
    mode: ClarificationMode,
    reprompts: u32,
}

/// Session-scoped conversation state
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub messages: Vec<Message>,
    pub processing: bool,
    pub progress: u8,
    pub status: String,
    pub mood: Mood,
    mode: ClarificationMode,
    reprompts: u32,
    recent_batches: VecDeque<ExtractionBatch>,
    last_raw_text: Option<String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            status: "Ready".to_string(),
            ..Default::default()
        }
    }

    pub fn mode(&self) -> &ClarificationMode {
        &self.mode
    }

    /// Enter a clarification mode, replacing whatever was pending
    pub fn enter(&mut self, mode: ClarificationMode) {
        self.mode = mode;
        self.reprompts = 0;
    }

    pub fn clear_mode(&mut self) {
        self.enter(ClarificationMode::None);
    }

    /// Take the pending mode, leaving `None` behind
    pub fn take_mode(&mut self) -> ClarificationMode {
        self.reprompts = 0;
        std::mem::take(&mut self.mode)
    }

    /// The pending mode together with its reprompt count
    pub fn save_clarification(&self) -> SavedClarification {
        SavedClarification {
            mode: self.mode.clone(),
            reprompts: self.reprompts,
        }
    }

    /// Put back a saved clarification exactly as it was, count included
    pub fn restore_clarification(&mut self, saved: SavedClarification) {
        self.mode = saved.mode;
        self.reprompts = saved.reprompts;
    }

    /// Count an unparsable reply; returns the new count
    pub fn note_reprompt(&mut self) -> u32 {
        self.reprompts += 1;
        self.reprompts
    }

    pub fn reprompts(&self) -> u32 {
        self.reprompts
    }

    pub fn push_message(&mut self, speaker: Speaker, content: &str, max_history: usize) {
        self.messages.push(Message {
            speaker,
            content: content.to_string(),
            at: Utc::now(),
        });
        if max_history > 0 && self.messages.len() > max_history {
            let excess = self.messages.len() - max_history;
            self.messages.drain(..excess);
        }
    }

    /// Remember an extraction batch for later corrections
    pub fn remember_batch(&mut self, batch: ExtractionBatch, cap: usize) {
        self.last_raw_text = Some(batch.source_text.clone());
        self.recent_batches.push_back(batch);
        while self.recent_batches.len() > cap.max(1) {
            self.recent_batches.pop_front();
        }
    }

    pub fn last_batch(&self) -> Option<&ExtractionBatch> {
        self.recent_batches.back()
    }

    pub fn recent_batches(&self) -> impl Iterator<Item = &ExtractionBatch> {
        self.recent_batches.iter().rev()
    }

    pub fn last_raw_text(&self) -> Option<&str> {
        self.last_raw_text.as_deref()
    }

    pub fn set_progress(&mut self, percent: u8, status: &str) {
        self.progress = percent.min(100);
        self.status = status.to_string();
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            messages: self.messages.clone(),
            processing: self.processing,
            progress: self.progress,
            status: self.status.clone(),
            mood: self.mood,
            mode: self.mode.name(),
        }
    }
}

/// Read-only view of the conversation surface
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSnapshot {
    pub messages: Vec<Message>,
    pub processing: bool,
    pub progress: u8,
    pub status: String,
    pub mood: Mood,
    pub mode: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entering_a_mode_replaces_the_previous_one() {
        let mut state = ConversationState::new();
        state.enter(ClarificationMode::AwaitingDirection {
            txn_ids: vec!["a".into()],
        });
        state.note_reprompt();

        state.enter(ClarificationMode::AwaitingDuplicateConfirmation {
            pending: vec![],
            batch_id: "b".into(),
        });
        assert!(matches!(
            state.mode(),
            ClarificationMode::AwaitingDuplicateConfirmation { .. }
        ));
        assert_eq!(state.reprompts(), 0);
    }

    #[test]
    fn test_restore_keeps_reprompt_count() {
        let mut state = ConversationState::new();
        state.enter(ClarificationMode::AwaitingDirection {
            txn_ids: vec!["a".into()],
        });
        state.note_reprompt();
        state.note_reprompt();
        let saved = state.save_clarification();

        state.clear_mode();
        state.restore_clarification(saved);
        assert!(matches!(state.mode(), ClarificationMode::AwaitingDirection { .. }));
        assert_eq!(state.reprompts(), 2);
        assert_eq!(state.note_reprompt(), 3);
    }

    #[test]
    fn test_take_mode_clears() {
        let mut state = ConversationState::new();
        state.enter(ClarificationMode::AwaitingCountCorrection {
            last_raw_text: "x".into(),
        });
        let taken = state.take_mode();
        assert_eq!(taken.name(), "awaiting_count_correction");
        assert!(!state.mode().is_active());
    }

    #[test]
    fn test_history_and_batches_are_capped() {
        let mut state = ConversationState::new();
        for i in 0..5 {
            state.push_message(Speaker::User, &i.to_string(), 3);
            state.remember_batch(ExtractionBatch::new(&i.to_string(), "text", &[]), 2);
        }
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[0].content, "2");
        assert_eq!(state.recent_batches().count(), 2);
        assert_eq!(state.last_batch().map(|b| b.batch_id.as_str()), Some("4"));
    }

    #[test]
    fn test_snapshot_names_mode() {
        let mut state = ConversationState::new();
        state.enter(ClarificationMode::AwaitingDirection { txn_ids: vec![] });
        let snap = state.snapshot();
        assert_eq!(snap.mode, "awaiting_direction");
        assert_eq!(snap.status, "Ready");
    }
}
