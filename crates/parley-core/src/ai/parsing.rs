//! Deserialization boundary for LLM output
//!
//! Models answer in several shapes: a bare array, an object wrapping the
//! array, JSON inside markdown fences, or JSON surrounded by chatter. Every
//! response is normalized here into one canonical Rust shape. Anything that
//! cannot be normalized is `Error::MalformedResponse`; individual records
//! that fail field validation are dropped, never repaired.

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{round_cents, Direction, Transaction, TxDate};

fn truncate(raw: &str) -> String {
    if raw.len() > 200 {
        let mut end = 200;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &raw[..end])
    } else {
        raw.to_string()
    }
}

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the language tag on the opening fence line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Locate and parse the JSON value in a response
fn extract_json(response: &str) -> Result<Value> {
    let text = strip_code_fences(response);
    if text.is_empty() {
        return Err(Error::MalformedResponse("empty response".into()));
    }

    let start = text.find(|c| c == '{' || c == '[');
    let (start, close) = match start {
        Some(s) if text[s..].starts_with('{') => (s, '}'),
        Some(s) => (s, ']'),
        None => {
            return Err(Error::MalformedResponse(format!(
                "No JSON found in response | Raw: {}",
                truncate(text)
            )))
        }
    };
    let end = text.rfind(close).filter(|&e| e > start).ok_or_else(|| {
        Error::MalformedResponse(format!("Unterminated JSON | Raw: {}", truncate(text)))
    })?;

    let json_str = &text[start..=end];
    serde_json::from_str(json_str).map_err(|e| {
        Error::MalformedResponse(format!("Invalid JSON: {} | Raw: {}", e, truncate(json_str)))
    })
}

/// Pull the record list out of a bare array or an object wrapping one
fn list_under(value: Value, key: &str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove(key) {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(Error::MalformedResponse(format!(
                "`{}` is not a list: {}",
                key,
                truncate(&other.to_string())
            ))),
            None => Err(Error::MalformedResponse(format!("missing `{}` list", key))),
        },
        other => Err(Error::MalformedResponse(format!(
            "expected a list or object, got {}",
            truncate(&other.to_string())
        ))),
    }
}

fn string_field<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str).map(str::trim)
}

/// Amount as a number or a numeric string ("$1,200.50")
fn amount_field(record: &Value) -> Option<f64> {
    match record.get("amount")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .parse()
            .ok(),
        _ => None,
    }
}

/// Validate one record field by field
fn validate_record(record: &Value) -> std::result::Result<Transaction, String> {
    let description = string_field(record, "description")
        .filter(|d| !d.is_empty())
        .ok_or("missing description")?;

    let amount = amount_field(record).ok_or("missing or non-numeric amount")?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(format!("amount must be positive, got {}", amount));
    }

    let date = match record.get("date") {
        None | Some(Value::Null) => TxDate::Unknown,
        Some(Value::String(s)) => s.parse::<TxDate>()?,
        Some(other) => return Err(format!("date is not a string: {}", other)),
    };

    let direction = match string_field(record, "direction") {
        None | Some("") => Direction::Unknown,
        Some(raw) => raw.parse::<Direction>()?,
    };

    let details = string_field(record, "details").unwrap_or_default();
    let payment_type = string_field(record, "type").unwrap_or_default();

    Ok(Transaction::new(date, description, round_cents(amount), direction)
        .with_details(details)
        .with_payment_type(payment_type))
}

/// Parse an extraction response into validated transactions
///
/// Accepts a bare array or `{"transactions": [...]}`. Records that fail
/// validation are dropped.
pub fn parse_transactions(response: &str) -> Result<Vec<Transaction>> {
    let records = list_under(extract_json(response)?, "transactions")?;
    let total = records.len();

    let transactions: Vec<Transaction> = records
        .iter()
        .filter_map(|record| match validate_record(record) {
            Ok(tx) => Some(tx),
            Err(reason) => {
                debug!(%reason, "Dropping invalid extracted record");
                None
            }
        })
        .collect();

    if transactions.len() < total {
        debug!(kept = transactions.len(), total, "Extraction response had invalid records");
    }
    Ok(transactions)
}

/// Parse a segmentation response into non-empty chunk texts
///
/// Accepts `{"chunks": [...]}` or a bare array; items are strings or objects
/// with a `text` field.
pub fn parse_chunks(response: &str) -> Result<Vec<String>> {
    let items = list_under(extract_json(response)?, "chunks")?;
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            Value::Object(mut map) => match map.remove("text") {
                Some(Value::String(s)) => Some(s),
                _ => None,
            },
            _ => None,
        })
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
