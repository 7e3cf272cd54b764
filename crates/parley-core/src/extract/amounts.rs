//! Currency amount recognition shared by the extraction strategies

use regex::{Captures, Regex};
use std::sync::OnceLock;

/// A currency amount found in text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoneyMatch {
    /// Absolute value, rounded to cents
    pub value: f64,
    /// Leading minus or accounting parentheses
    pub negative: bool,
    /// Explicit leading plus
    pub positive: bool,
    pub start: usize,
    pub end: usize,
}

/// `$1,234.56`, `-$40`, `($12.00)`, `+ $5`, `40.00 USD`, `20 dollars`
fn money_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?ix)
            (?P<paren>\()?
            (?P<sign>[-+\x{2212}])?\s?
            (?:
                (?:[$€£]|\bUSD\s?|\bEUR\s?|\bGBP\s?)\s?(?P<a>\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)
              |
                (?P<b>\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)\s?(?:USD|EUR|GBP|dollars?|bucks)\b
            )
            (?P<close>\))?",
        )
        .expect("money regex")
    })
}

fn to_match(caps: &Captures<'_>) -> Option<MoneyMatch> {
    let whole = caps.get(0)?;
    let digits = caps.name("a").or_else(|| caps.name("b"))?.as_str();
    let value: f64 = digits.replace(',', "").parse().ok()?;
    let sign = caps.name("sign").map(|m| m.as_str());
    let parenthesized = caps.name("paren").is_some() && caps.name("close").is_some();
    Some(MoneyMatch {
        value: crate::models::round_cents(value),
        negative: parenthesized || matches!(sign, Some("-") | Some("\u{2212}")),
        positive: matches!(sign, Some("+")),
        start: whole.start(),
        end: whole.end(),
    })
}

/// All currency amounts in the text, in order
pub fn find_amounts(text: &str) -> Vec<MoneyMatch> {
    money_re()
        .captures_iter(text)
        .filter_map(|caps| to_match(&caps))
        .collect()
}

/// First currency amount in the text
pub fn first_amount(text: &str) -> Option<MoneyMatch> {
    money_re().captures(text).and_then(|caps| to_match(&caps))
}

/// Whether the text contains anything that looks like a currency amount
pub fn has_currency_amount(text: &str) -> bool {
    money_re().is_match(text)
}

/// `-40.00`, `1,203.22`, `(12.00)`: statement columns often drop the symbol
fn plain_decimal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?P<paren>\()?(?P<sign>[-+\x{2212}])?\b(?P<a>\d{1,3}(?:,\d{3})+\.\d{2}|\d+\.\d{2})\b(?P<close>\))?",
        )
        .expect("plain decimal regex")
    })
}

/// Currency amounts plus bare two-decimal figures, in order
///
/// Used for statement lines only; conversational text needs a currency marker.
pub fn statement_amounts(line: &str) -> Vec<MoneyMatch> {
    let mut found = find_amounts(line);
    for caps in plain_decimal_re().captures_iter(line) {
        let Some(m) = to_match(&caps) else {
            continue;
        };
        if found.iter().all(|f| m.end <= f.start || m.start >= f.end) {
            found.push(m);
        }
    }
    found.sort_by_key(|m| m.start);
    found
}

/// Amount at the very end of a line (statement amount column)
pub fn trailing_amount(line: &str) -> Option<MoneyMatch> {
    let trimmed = line.trim_end();
    statement_amounts(trimmed)
        .into_iter()
        .last()
        .filter(|m| trimmed[m.end..].trim().is_empty())
}

/// Whether the text carries any amount the extractors can use
pub fn has_amount_pattern(text: &str) -> bool {
    has_currency_amount(text) || text.lines().any(|line| trailing_amount(line).is_some())
}

/// Parse a loose amount such as `50`, `$50.25`, `1,200` (used for corrections)
pub fn parse_loose_amount(text: &str) -> Option<f64> {
    if let Some(m) = first_amount(text) {
        return Some(m.value);
    }
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)\b").expect("loose amount regex")
    });
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .map(crate::models::round_cents)
}
