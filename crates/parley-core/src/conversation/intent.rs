//! Per-turn intent classification
//!
//! A message is classified once into the ordered list of intents whose
//! predicates it satisfies. The router offers the message to the matching
//! handlers in that order and the first one to claim it wins.

use std::sync::OnceLock;

use regex::Regex;

use crate::direction::parse_direction_answer;
use crate::extract::amounts::{has_amount_pattern, parse_loose_amount};
use crate::extract::dates::find_date;
use crate::models::Direction;

use super::state::ConversationState;

/// Handler precedence, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Answer to the pending clarification question
    ClarificationReply,
    /// "You missed some", "there should be 4 transactions"
    CountMismatch,
    /// "They're all expenses"
    BulkDirectionOverride,
    /// Supplies a missing amount or date for the last extraction
    FillMissingDetail,
    /// "It was actually $50", "that was income"
    FieldCorrection,
    /// Large paste over the bulk threshold
    BulkExtraction,
    /// A message with an amount in it
    Extraction,
    /// Greetings, thanks and feelings
    SmallTalk,
    Fallback,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClarificationReply => "clarification_reply",
            Self::CountMismatch => "count_mismatch",
            Self::BulkDirectionOverride => "bulk_direction_override",
            Self::FillMissingDetail => "fill_missing_detail",
            Self::FieldCorrection => "field_correction",
            Self::BulkExtraction => "bulk_extraction",
            Self::Extraction => "extraction",
            Self::SmallTalk => "small_talk",
            Self::Fallback => "fallback",
        }
    }

    /// Every intent in priority order
    pub fn all() -> &'static [Intent] {
        &[
            Self::ClarificationReply,
            Self::CountMismatch,
            Self::BulkDirectionOverride,
            Self::FillMissingDetail,
            Self::FieldCorrection,
            Self::BulkExtraction,
            Self::Extraction,
            Self::SmallTalk,
            Self::Fallback,
        ]
    }

    /// Intents whose predicates match, highest priority first
    ///
    /// A pending clarification makes its reply the only candidate besides the
    /// fallback, so no generic intent can take over an answer.
    pub fn candidates(message: &str, state: &ConversationState, bulk_threshold: usize) -> Vec<Intent> {
        if state.mode().is_active() {
            return vec![Self::ClarificationReply, Self::Fallback];
        }

        let has_batch = state.last_batch().is_some();
        let mut out = Vec::new();

        if count_mismatch_re().is_match(message) && state.last_raw_text().is_some() {
            out.push(Self::CountMismatch);
        }
        if has_batch && bulk_override_direction(message).is_some() {
            out.push(Self::BulkDirectionOverride);
        }
        if has_batch && is_bare_detail(message) {
            out.push(Self::FillMissingDetail);
        }
        if has_batch && correction_re().is_match(message) {
            out.push(Self::FieldCorrection);
        }
        if message.chars().count() > bulk_threshold && has_amount_pattern(message) {
            out.push(Self::BulkExtraction);
        }
        if has_amount_pattern(message) {
            out.push(Self::Extraction);
        }
        if small_talk_re().is_match(message) {
            out.push(Self::SmallTalk);
        }
        out.push(Self::Fallback);
        out
    }
}

/// Words allowed around a bare amount or date ("it was about $30 on Monday")
const DETAIL_FILLER: &[&str] = &[
    "it", "was", "is", "were", "the", "amount", "date", "total", "cost", "on", "for", "about",
    "around", "roughly", "i", "think", "that", "and", "actually", "just", "of", "happened",
];

/// Message is only a missing amount or date plus filler words
fn is_bare_detail(message: &str) -> bool {
    // Only detects a date phrase, so any reference works
    let anchor = chrono::NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();
    let mut rest = message.to_string();
    let mut found = false;
    if let Some(date) = find_date(message, anchor) {
        rest.replace_range(date.span, " ");
        found = true;
    }
    for word in rest.split_whitespace() {
        if word.chars().any(|c| c.is_ascii_digit()) {
            found |= parse_loose_amount(word).is_some();
            continue;
        }
        let word = word
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
            .to_lowercase();
        if !word.is_empty() && !DETAIL_FILLER.contains(&word.as_str()) {
            return false;
        }
    }
    found
}

fn count_mismatch_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:you\s+)?(?:missed|skipped|forgot|left out|didn't get|did not get)\b|\bthere\s+(?:should\s+be|were|are|was)\s+(?:\d+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)\s+(?:transactions?|of them|entries|items)\b|\bonly\s+(?:got|found|caught)\b",
        )
        .expect("count mismatch regex")
    })
}

fn bulk_override_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:(?:they|these|those)(?:'re|\s+are|\s+were)?\s+(?:all\s+)?|all\s+(?:of\s+)?(?:them|these|those)(?:\s+are|\s+were)?\s+|mark\s+(?:them\s+)?all\s+as\s+|everything\s+(?:is|was)\s+)",
        )
        .expect("bulk override regex")
    })
}

fn correction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:actually|it\s+was|it's|that\s+was|that's|should\s+(?:be|have\s+been)|was\s+really|correct(?:ion)?|change\s+(?:it|that|the)|wrong|not\s+\$?\d)",
        )
        .expect("correction regex")
    })
}

fn small_talk_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:hi|hello|hey|yo|good\s+(?:morning|afternoon|evening)|thanks?|thank\s+you|thx|cheers|bye|goodbye|ok(?:ay)?|cool|great|awesome|ugh|sigh)\b|\b(?:how\s+are\s+you|i'?m\s+(?:so\s+)?(?:stressed|worried|broke|anxious|frustrated|annoyed|happy|excited)|this\s+is\s+(?:annoying|frustrating))\b",
        )
        .expect("small talk regex")
    })
}

/// Direction named by a bulk override phrase ("these are all expenses")
pub fn bulk_override_direction(message: &str) -> Option<Direction> {
    let first_line = message.lines().next()?.trim();
    if first_line.chars().count() > 100 || !bulk_override_re().is_match(first_line) {
        return None;
    }
    parse_direction_answer(first_line)
}

/// Mood suggested by wording, if any
pub fn detect_mood(message: &str) -> Option<super::state::Mood> {
    use super::state::Mood;

    static FRUSTRATED: OnceLock<Regex> = OnceLock::new();
    static STRESSED: OnceLock<Regex> = OnceLock::new();
    static POSITIVE: OnceLock<Regex> = OnceLock::new();

    let frustrated = FRUSTRATED.get_or_init(|| {
        Regex::new(r"(?i)\b(?:ugh|annoy\w*|frustrat\w*|stupid|hate|useless|wrong again)\b")
            .expect("frustrated regex")
    });
    let stressed = STRESSED.get_or_init(|| {
        Regex::new(r"(?i)\b(?:stress\w*|worried|anxious|broke|overwhelm\w*|scared)\b")
            .expect("stressed regex")
    });
    let positive = POSITIVE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:thanks?|thank you|great|awesome|love|happy|excited|perfect|nice)\b")
            .expect("positive regex")
    });

    if frustrated.is_match(message) {
        Some(Mood::Frustrated)
    } else if stressed.is_match(message) {
        Some(Mood::Stressed)
    } else if positive.is_match(message) {
        Some(Mood::Positive)
    } else {
        None
    }
}

/// Number the user gave as a transaction count ("4", "four")
pub fn parse_count(message: &str) -> Option<usize> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,3}|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)\b")
            .expect("count regex")
    });
    let word = re.captures(message)?.get(1)?.as_str().to_lowercase();
    let n = match word.as_str() {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        digits => digits.parse().ok()?,
    };
    (n > 0).then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::state::{ClarificationMode, Mood};
    use crate::models::ExtractionBatch;

    fn with_batch() -> ConversationState {
        let mut state = ConversationState::new();
        state.remember_batch(ExtractionBatch::new("b1", "I spent $20 at Target", &[]), 5);
        state
    }

    #[test]
    fn test_pending_clarification_blocks_generic_intents() {
        let mut state = with_batch();
        state.enter(ClarificationMode::AwaitingDirection { txn_ids: vec![] });
        let candidates = Intent::candidates("spent $20 at Target", &state, 1200);
        assert_eq!(candidates, vec![Intent::ClarificationReply, Intent::Fallback]);
    }

    #[test]
    fn test_priority_order() {
        let state = with_batch();
        let candidates = Intent::candidates("it was actually $50", &state, 1200);
        assert_eq!(
            candidates,
            vec![
                Intent::FillMissingDetail,
                Intent::FieldCorrection,
                Intent::Extraction,
                Intent::Fallback
            ]
        );
    }

    #[test]
    fn test_count_mismatch_needs_prior_text() {
        let state = ConversationState::new();
        assert_eq!(
            Intent::candidates("you missed some", &state, 1200),
            vec![Intent::Fallback]
        );
        let state = with_batch();
        assert_eq!(
            Intent::candidates("there should be 4 transactions", &state, 1200)[0],
            Intent::CountMismatch
        );
    }

    #[test]
    fn test_new_transaction_is_not_a_detail() {
        let state = with_batch();
        let candidates = Intent::candidates("I bought coffee for $5", &state, 1200);
        assert_eq!(candidates, vec![Intent::Extraction, Intent::Fallback]);
        assert_eq!(
            Intent::candidates("$30 yesterday", &state, 1200)[0],
            Intent::FillMissingDetail
        );
    }

    #[test]
    fn test_bulk_threshold() {
        let state = ConversationState::new();
        let text = "04/01/2025 STORE $1.00\n".repeat(10);
        assert_eq!(Intent::candidates(&text, &state, 100)[0], Intent::BulkExtraction);
        assert_eq!(Intent::candidates(&text, &state, 10_000)[0], Intent::Extraction);
    }

    #[test]
    fn test_bulk_override_direction() {
        assert_eq!(bulk_override_direction("these are all expenses"), Some(Direction::Out));
        assert_eq!(bulk_override_direction("They're all income"), Some(Direction::In));
        assert_eq!(bulk_override_direction("I spent $5 on coffee"), None);
    }

    #[test]
    fn test_small_talk_and_mood() {
        let state = ConversationState::new();
        assert_eq!(
            Intent::candidates("hello there", &state, 1200),
            vec![Intent::SmallTalk, Intent::Fallback]
        );
        assert_eq!(detect_mood("ugh this is annoying"), Some(Mood::Frustrated));
        assert_eq!(detect_mood("thanks!"), Some(Mood::Positive));
        assert_eq!(detect_mood("what's up"), None);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("there should be 4 transactions"), Some(4));
        assert_eq!(parse_count("four"), Some(4));
        assert_eq!(parse_count("none"), None);
        assert_eq!(parse_count("0"), None);
    }
}
