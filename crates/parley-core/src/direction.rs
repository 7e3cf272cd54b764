//! Direction inference from keywords
//!
//! Direction is only ever inferred from explicit evidence: income/expense
//! wording or a signed statement amount. Text without such evidence stays
//! `Direction::Unknown`.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::Direction;

fn income_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:received|receive|got paid|was paid|were paid|get paid|earned|earn|income|salary|payroll|paycheck|direct deposit|deposit(?:ed)?|refund(?:ed)?|reimburse(?:d|ment)?|cashback|cash back|interest paid|dividend|credit(?:ed)?|incoming|sold|got)\b",
        )
        .expect("income keyword regex")
    })
}

fn expense_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:spent|spend|paid|pay|payments?|bought|buy|purchased?|purchase|debit(?:ed)?|withdrawal|withdrew|withdraw|fee|charged?|bill|expense|outgoing|atm|pos|subscription|rent|donated)\b",
        )
        .expect("expense keyword regex")
    })
}

/// "got paid" and friends are income even though they contain "paid"
fn passive_paid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:got|get|gets|was|were|being|been)\s+paid\b").expect("passive paid regex")
    })
}

/// Reply-level phrases that name a direction ("it was income", "expense")
///
/// A bare "in" or "out" only counts as the whole reply, so "paid in cash"
/// is not read as income.
fn answer_in_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*in\s*[.!]?\s*$|\b(?:income|incoming|received|money in|came in|coming in|deposit(?:ed)?|credit(?:ed)?|earned|got paid|refund(?:ed)?)\b",
        )
        .expect("direction answer regex")
    })
}

fn answer_out_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*out\s*[.!]?\s*$|\b(?:expenses?|outgoing|money out|went out|going out|spent|paid|debit(?:ed)?|purchases?|spending|bills?)\b",
        )
        .expect("direction answer regex")
    })
}

/// Infer direction from wording in free text
///
/// Income wording beats expense wording only when expense wording is absent;
/// when both appear the result is `Unknown` rather than a guess.
pub fn infer_from_keywords(text: &str) -> Direction {
    let income = income_re().is_match(text);
    let without_passive = passive_paid_re().replace_all(text, " ");
    let expense = expense_re().is_match(&without_passive);
    match (income, expense) {
        (true, false) => Direction::In,
        (false, true) => Direction::Out,
        _ => Direction::Unknown,
    }
}

/// Direction for a statement entry: the amount sign wins, keywords decide otherwise
pub fn infer_for_statement(negative: bool, positive: bool, text: &str) -> Direction {
    if negative {
        return Direction::Out;
    }
    if positive {
        return Direction::In;
    }
    infer_from_keywords(text)
}

/// Parse a user's answer to "was this income or an expense?"
pub fn parse_direction_answer(reply: &str) -> Option<Direction> {
    let is_in = answer_in_re().is_match(reply);
    let is_out = answer_out_re().is_match(reply);
    match (is_in, is_out) {
        (true, false) => Some(Direction::In),
        (false, true) => Some(Direction::Out),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_inference() {
        assert_eq!(infer_from_keywords("spent $20 at Target"), Direction::Out);
        assert_eq!(infer_from_keywords("received $500 from Acme"), Direction::In);
        assert_eq!(infer_from_keywords("Direct Deposit ACME PAYROLL"), Direction::In);
        assert_eq!(infer_from_keywords("got paid $500 by Acme"), Direction::In);
    }

    #[test]
    fn test_no_keyword_stays_unknown() {
        assert_eq!(infer_from_keywords("Amazon $40.00 4/1/2025"), Direction::Unknown);
        assert_eq!(infer_from_keywords("Zelle to Sam"), Direction::Unknown);
    }

    #[test]
    fn test_conflicting_keywords_stay_unknown() {
        assert_eq!(
            infer_from_keywords("refund for the purchase"),
            Direction::Unknown
        );
    }

    #[test]
    fn test_statement_sign_wins() {
        assert_eq!(infer_for_statement(true, false, "DEPOSIT"), Direction::Out);
        assert_eq!(infer_for_statement(false, true, "PURCHASE"), Direction::In);
        assert_eq!(infer_for_statement(false, false, "POS PURCHASE"), Direction::Out);
    }

    #[test]
    fn test_direction_answers() {
        assert_eq!(parse_direction_answer("it was income"), Some(Direction::In));
        assert_eq!(parse_direction_answer("expense"), Some(Direction::Out));
        assert_eq!(parse_direction_answer("money out"), Some(Direction::Out));
        assert_eq!(parse_direction_answer("hmm not sure"), None);
    }

    #[test]
    fn test_bare_in_and_out_only_as_whole_reply() {
        assert_eq!(parse_direction_answer("in"), Some(Direction::In));
        assert_eq!(parse_direction_answer(" Out. "), Some(Direction::Out));
        assert_eq!(parse_direction_answer("the money came in"), Some(Direction::In));
        assert_eq!(parse_direction_answer("paid in cash"), Some(Direction::Out));
        assert_eq!(parse_direction_answer("in the morning"), None);
    }
}
