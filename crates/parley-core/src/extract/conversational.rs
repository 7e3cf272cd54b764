//! Template extraction for conversational sentences
//!
//! Handles phrasings like "spent $20 at Target yesterday", "got $500 from Acme
//! Corp last Monday", "$15 for lunch" and "Amazon $40.00 4/1/2025". A message
//! is split into clauses, each clause with a currency amount becomes at most
//! one transaction.

use chrono::NaiveDate;
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;
use tracing::debug;

use super::amounts::{first_amount, has_currency_amount};
use super::dates::find_date;
use super::statement::infer_payment_type;
use crate::direction::infer_from_keywords;
use crate::models::{Direction, Transaction, TxDate};

fn clause_separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s+and\s+|\s+then\s+|\s+plus\s+|;|\n|\.\s+|,\s+").expect("clause separator regex")
    })
}

/// "bought coffee for", "sold my bike for"
fn object_for_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?P<verb>bought|purchased|got|paid for|ordered|sold)\s+(?P<desc>.+?)\s+for\s*$")
            .expect("object-for regex")
    })
}

/// Income verb directly before the amount
fn income_verb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:received|receive|got paid|get paid|was paid|were paid|got back|got|get|earned|earn|made|collected|was refunded|refunded|deposited)\s*$",
        )
        .expect("income verb regex")
    })
}

/// Expense verb directly before the amount
fn expense_verb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:spent|spend|spending|paid|pay|paying|dropped|blew|sent|gave|donated|lost|tipped|was charged|got charged|charged)\s*$",
        )
        .expect("expense verb regex")
    })
}

fn leading_filler_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:(?:i|we|i've|we've|i'd|just|also|and|then|so|oh|um|ok|okay)\s+)+").expect("filler regex")
    })
}

fn leading_preposition_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:at|on|for|from|to|in|by|with)\s+").expect("preposition regex")
    })
}

fn trailing_preposition_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s+(?:at|on|for|from|to|in|by|with|and)$").expect("trailing preposition regex")
    })
}

/// How a clause's direction was established
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Evidence {
    /// A verb template fixed the direction
    Verb(Direction),
    /// Bare or prefixed amount; direction from keywords if any
    Bare,
}

/// Split a message into clause byte ranges, one amount-bearing clause each
///
/// Pieces without an amount are merged into the following clause ("Barnes and
/// Noble $20"), or into the previous one when they carry a date or a year.
fn split_clauses(text: &str) -> Vec<Range<usize>> {
    let mut pieces: Vec<Range<usize>> = Vec::new();
    let mut cursor = 0;
    for sep in clause_separator_re().find_iter(text) {
        pieces.push(cursor..sep.start());
        cursor = sep.end();
    }
    pieces.push(cursor..text.len());

    let mut clauses: Vec<Range<usize>> = Vec::new();
    let mut pending_start: Option<usize> = None;
    // Only used to detect date-bearing fragments, so any reference works
    let anchor = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();

    for piece in pieces {
        let fragment = text[piece.clone()].trim();
        if fragment.is_empty() {
            continue;
        }
        if has_currency_amount(fragment) {
            let start = pending_start.take().unwrap_or(piece.start);
            clauses.push(start..piece.end);
            continue;
        }
        let attaches_back = pending_start.is_none()
            && (find_date(fragment, anchor).is_some()
                || fragment.starts_with(|c: char| c.is_ascii_digit()));
        match clauses.last_mut() {
            Some(last) if attaches_back => last.end = piece.end,
            _ => {
                pending_start.get_or_insert(piece.start);
            }
        }
    }

    clauses
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_description(raw: &str) -> String {
    let mut text = collapse(raw);
    text = leading_filler_re().replace(&text, "").to_string();
    text = leading_preposition_re().replace(&text, "").to_string();
    loop {
        let trimmed = text
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ';' | ':' | '-'))
            .trim()
            .to_string();
        let stripped = trailing_preposition_re().replace(&trimmed, "").to_string();
        if stripped == text {
            break;
        }
        text = stripped;
    }
    text
}

/// Parse one clause into a transaction and the evidence for its direction
fn parse_clause(clause: &str, reference: NaiveDate) -> Option<(Transaction, Evidence)> {
    let (date, body) = match find_date(clause, reference) {
        Some(found) => (
            found.date,
            collapse(&format!("{} {}", &clause[..found.span.start], &clause[found.span.end..])),
        ),
        None => (reference, collapse(clause)),
    };

    let money = first_amount(&body)?;
    let before = body[..money.start].trim();
    let after = body[money.end..].trim();

    let (description, details, evidence) = if let Some(caps) = object_for_re().captures(before) {
        let verb = caps.name("verb").map(|m| m.as_str().to_lowercase());
        let direction = if verb.as_deref() == Some("sold") {
            Direction::In
        } else {
            Direction::Out
        };
        let desc = caps.name("desc").map(|m| m.as_str()).unwrap_or_default();
        (clean_description(desc), clean_description(after), Evidence::Verb(direction))
    } else if income_verb_re().is_match(before) {
        (clean_description(after), String::new(), Evidence::Verb(Direction::In))
    } else if expense_verb_re().is_match(before) {
        (clean_description(after), String::new(), Evidence::Verb(Direction::Out))
    } else {
        let lead = clean_description(before);
        if lead.is_empty() {
            (clean_description(after), String::new(), Evidence::Bare)
        } else {
            (lead, clean_description(after), Evidence::Bare)
        }
    };

    let description = if description.is_empty() {
        "Unspecified".to_string()
    } else {
        description
    };

    let direction = match evidence {
        Evidence::Verb(direction) => direction,
        Evidence::Bare => infer_from_keywords(&body),
    };

    let tx = Transaction::new(TxDate::Known(date), &description, money.value, direction)
        .with_details(&details)
        .with_payment_type(infer_payment_type(&body));
    Some((tx, evidence))
}

/// Extract transactions from a conversational message
///
/// A bare amount with no direction wording inherits the direction a verb
/// established earlier in the same message ("spent $20 at Target and $15 at
/// Walmart"); otherwise it stays `Unknown`. Dates default to the reference date.
pub fn extract_conversational(text: &str, reference: NaiveDate) -> Vec<Transaction> {
    let mut transactions = Vec::new();
    let mut carried: Option<Direction> = None;

    for range in split_clauses(text) {
        let clause = &text[range];
        let Some((mut tx, evidence)) = parse_clause(clause, reference) else {
            continue;
        };
        match evidence {
            Evidence::Verb(direction) => carried = Some(direction),
            Evidence::Bare => {
                if tx.direction == Direction::Unknown {
                    if let Some(direction) = carried {
                        tx.direction = direction;
                    }
                }
            }
        }
        transactions.push(tx);
    }

    debug!(count = transactions.len(), "Conversational extractor finished");
    transactions
}
