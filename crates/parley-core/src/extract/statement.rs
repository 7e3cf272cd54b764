//! Bank-statement block extraction
//!
//! A statement entry is a run of lines that starts with a dated line and ends
//! with a line carrying a trailing currency amount. Both may be the same line:
//!
//! ```text
//! 04/01/2025 AMAZON MKTPLACE PMTS -$40.00
//!
//! 04/02/2025 ZELLE PAYMENT TO SAM
//!   Conf# 8812
//!   $25.00
//! ```
//!
//! Extraction is deterministic: the same text and reference date always yield
//! the same date, amount and direction for every entry.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use super::amounts::{statement_amounts, trailing_amount, MoneyMatch};
use super::dates::parse_leading_date;
use crate::direction::infer_for_statement;
use crate::models::{Transaction, TxDate};

/// One statement entry before it becomes a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct StatementBlock {
    pub date: NaiveDate,
    /// Source lines of the block, trimmed
    pub lines: Vec<String>,
}

impl StatementBlock {
    /// Raw text of the block, one source line per line
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

fn payment_type_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"(?i)\b(?:direct dep(?:osit)?|dir dep)\b", "Direct Deposit"),
            (r"(?i)\bzelle\b", "Zelle"),
            (r"(?i)\bvenmo\b", "Venmo"),
            (r"(?i)\bwire\b", "Wire"),
            (r"(?i)\batm\b", "ATM"),
            (r"(?i)\b(?:check|chk|cheque)\b", "Check"),
            (r"(?i)\bach\b", "ACH"),
            (r"(?i)\b(?:transfer|xfer|trnsfr)\b", "Transfer"),
            (
                r"(?i)\b(?:pos|debit card|card|visa|mastercard|purchase)\b",
                "Card",
            ),
        ]
        .into_iter()
        .map(|(pattern, label)| {
            (
                Regex::new(pattern).expect("payment type regex"),
                label,
            )
        })
        .collect()
    })
}

/// Summary rows that carry a date and an amount but are not transactions
fn balance_row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:(?:beginning|ending|opening|closing|available|statement|daily|previous|new) balance|balance forward|total (?:debits|credits|fees))\b",
        )
        .expect("balance row regex")
    })
}

/// Payment channel named in the text, or an empty string
pub fn infer_payment_type(text: &str) -> &'static str {
    payment_type_rules()
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, label)| *label)
        .unwrap_or("")
}

/// Split text into statement blocks
///
/// Lines outside a block are ignored. A dated line that appears before the
/// open block is closed starts a new block and discards the unfinished one.
pub fn find_blocks(text: &str, reference: NaiveDate) -> Vec<StatementBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<StatementBlock> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some((date, _)) = parse_leading_date(line, reference) {
            if let Some(dropped) = open.take() {
                debug!(lines = dropped.lines.len(), "Discarding statement block without amount");
            }
            let block = StatementBlock {
                date,
                lines: vec![line.to_string()],
            };
            if trailing_amount(line).is_some() {
                blocks.push(block);
            } else {
                open = Some(block);
            }
            continue;
        }

        if let Some(block) = open.as_mut() {
            block.lines.push(line.to_string());
            if trailing_amount(line).is_some() {
                if let Some(done) = open.take() {
                    blocks.push(done);
                }
            }
        }
    }

    blocks
}

/// Amount column of a closing line
///
/// When the line ends in two adjacent amounts the second is a running balance
/// and the first is the transaction amount.
fn amount_column(line: &str) -> Option<MoneyMatch> {
    let last = trailing_amount(line)?;
    let amounts = statement_amounts(line);
    if amounts.len() >= 2 {
        let prev = amounts[amounts.len() - 2];
        if line[prev.end..last.start].trim().is_empty() {
            return Some(prev);
        }
    }
    Some(last)
}

fn strip_span(line: &str, start: usize, end: usize) -> String {
    format!("{} {}", &line[..start], &line[end..])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn block_to_transaction(block: &StatementBlock, reference: NaiveDate) -> Option<Transaction> {
    let closing = block.lines.last()?;
    let money = amount_column(closing)?;

    // Text of each line with the date and trailing amount columns removed
    let mut texts: Vec<String> = Vec::with_capacity(block.lines.len());
    for (i, line) in block.lines.iter().enumerate() {
        let mut text = if i == 0 {
            parse_leading_date(line, reference)
                .map(|(_, rest)| rest.to_string())
                .unwrap_or_else(|| line.clone())
        } else {
            line.clone()
        };
        if i == block.lines.len() - 1 {
            // Re-locate the amount columns inside the date-stripped text
            let last = trailing_amount(&text);
            if let Some(last) = last {
                let cut = amount_column(&text).map(|m| m.start).unwrap_or(last.start);
                text = strip_span(&text, cut, text.len());
            }
        }
        texts.push(text.trim().to_string());
    }

    let mut parts = texts.into_iter().filter(|t| !t.is_empty());
    let description = parts.next().unwrap_or_default();
    let details = parts.collect::<Vec<_>>().join(" ");

    let block_text = block.text();
    if balance_row_re().is_match(&block_text) {
        return None;
    }
    let direction = infer_for_statement(money.negative, money.positive, &block_text);
    let payment_type = infer_payment_type(&block_text);

    let description = if description.is_empty() {
        "Statement entry".to_string()
    } else {
        description
    };

    Some(
        Transaction::new(TxDate::Known(block.date), &description, money.value, direction)
            .with_details(&details)
            .with_payment_type(payment_type),
    )
}

/// Extract transactions from statement-formatted text
pub fn extract_statement(text: &str, reference: NaiveDate) -> Vec<Transaction> {
    let transactions: Vec<Transaction> = find_blocks(text, reference)
        .iter()
        .filter_map(|block| block_to_transaction(block, reference))
        .collect();
    debug!(count = transactions.len(), "Statement extractor finished");
    transactions
}
