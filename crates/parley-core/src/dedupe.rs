//! Duplicate suppression for extracted transactions
//!
//! Two transactions are the same when their normalized date, amount (to the
//! cent), description and direction agree. Ids, categories and notes are
//! ignored.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::models::Transaction;

/// Result of deduplicating a candidate list
#[derive(Debug, Clone, Default)]
pub struct DedupeOutcome {
    /// Candidates that are neither in `existing` nor repeated earlier in the list
    pub unique: Vec<Transaction>,
    /// Candidates that were suppressed, in input order
    pub duplicates: Vec<Transaction>,
}

impl DedupeOutcome {
    pub fn duplicate_count(&self) -> usize {
        self.duplicates.len()
    }
}

/// Collapse runs of whitespace and lower-case
fn normalize_description(description: &str) -> String {
    description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Identity key for a transaction
pub fn dedupe_key(tx: &Transaction) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tx.date.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(format!("{:.2}", tx.amount).as_bytes());
    hasher.update(b"|");
    hasher.update(normalize_description(&tx.description).as_bytes());
    hasher.update(b"|");
    hasher.update(tx.direction.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// Remove candidates that already exist or repeat within the candidate list
///
/// First occurrence wins. Neither input is modified.
pub fn dedupe(candidates: &[Transaction], existing: &[Transaction]) -> DedupeOutcome {
    let mut seen: HashSet<String> = existing.iter().map(dedupe_key).collect();
    let mut outcome = DedupeOutcome::default();

    for candidate in candidates {
        if seen.insert(dedupe_key(candidate)) {
            outcome.unique.push(candidate.clone());
        } else {
            outcome.duplicates.push(candidate.clone());
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Direction, TxDate};
    use chrono::NaiveDate;

    fn tx(desc: &str, amount: f64, direction: Direction) -> Transaction {
        let date = TxDate::Known(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
        Transaction::new(date, desc, amount, direction)
    }

    #[test]
    fn test_matching_key_collapses() {
        let a = tx("Amazon  Marketplace", 40.0, Direction::Out);
        let b = tx("amazon marketplace", 40.004, Direction::Out);
        let outcome = dedupe(&[a.clone(), b], &[]);
        assert_eq!(outcome.unique.len(), 1);
        assert_eq!(outcome.unique[0].id, a.id);
        assert_eq!(outcome.duplicate_count(), 1);
    }

    #[test]
    fn test_differing_amount_keeps_both() {
        let a = tx("Amazon", 40.0, Direction::Out);
        let b = tx("Amazon", 41.0, Direction::Out);
        assert_eq!(dedupe(&[a, b], &[]).unique.len(), 2);
    }

    #[test]
    fn test_direction_is_part_of_key() {
        let a = tx("Venmo", 10.0, Direction::In);
        let b = tx("Venmo", 10.0, Direction::Out);
        assert_eq!(dedupe(&[a, b], &[]).unique.len(), 2);
    }

    #[test]
    fn test_existing_records_suppress() {
        let stored = tx("Target", 20.0, Direction::Out);
        let again = tx("TARGET", 20.0, Direction::Out);
        let fresh = tx("Costco", 80.0, Direction::Out);
        let outcome = dedupe(&[again, fresh.clone()], std::slice::from_ref(&stored));
        assert_eq!(outcome.unique.len(), 1);
        assert_eq!(outcome.unique[0].id, fresh.id);
        assert_eq!(outcome.duplicate_count(), 1);
    }

    #[test]
    fn test_inputs_untouched() {
        let candidates = vec![tx("A", 1.0, Direction::Out), tx("A", 1.0, Direction::Out)];
        let before = candidates.clone();
        let _ = dedupe(&candidates, &[]);
        assert_eq!(candidates, before);
    }
}
