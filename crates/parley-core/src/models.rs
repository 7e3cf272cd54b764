//! Domain models for Parley

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Direction of money movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Incoming money
    In,
    /// Outgoing money
    Out,
    /// Could not be determined. Never replaced by a guess.
    #[default]
    Unknown,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Human wording used in replies
    pub fn label(&self) -> &'static str {
        match self {
            Self::In => "income",
            Self::Out => "expense",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    /// Strict parse of the enum wire value (case-insensitive)
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction category (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Groceries,
    Dining,
    Shopping,
    Transport,
    Housing,
    Utilities,
    Entertainment,
    Healthcare,
    Travel,
    Subscriptions,
    Transfer,
    Income,
    /// Default expense bucket when nothing more specific matches
    #[default]
    Uncategorized,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groceries => "groceries",
            Self::Dining => "dining",
            Self::Shopping => "shopping",
            Self::Transport => "transport",
            Self::Housing => "housing",
            Self::Utilities => "utilities",
            Self::Entertainment => "entertainment",
            Self::Healthcare => "healthcare",
            Self::Travel => "travel",
            Self::Subscriptions => "subscriptions",
            Self::Transfer => "transfer",
            Self::Income => "income",
            Self::Uncategorized => "uncategorized",
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Self::Groceries,
            Self::Dining,
            Self::Shopping,
            Self::Transport,
            Self::Housing,
            Self::Utilities,
            Self::Entertainment,
            Self::Healthcare,
            Self::Travel,
            Self::Subscriptions,
            Self::Transfer,
            Self::Income,
            Self::Uncategorized,
        ]
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Calendar date of a transaction, or the explicit "unknown" marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TxDate {
    Known(NaiveDate),
    #[default]
    Unknown,
}

impl TxDate {
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Known(d) => Some(*d),
            Self::Unknown => None,
        }
    }
}

impl From<NaiveDate> for TxDate {
    fn from(date: NaiveDate) -> Self {
        Self::Known(date)
    }
}

impl std::fmt::Display for TxDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for TxDate {
    type Err = String;

    /// Accepts only `YYYY-MM-DD` or `unknown`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unknown") {
            return Ok(Self::Unknown);
        }
        if s.len() != 10 {
            return Err(format!("Invalid date: {}", s));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self::Known)
            .map_err(|_| format!("Invalid date: {}", s))
    }
}

impl Serialize for TxDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A financial transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub date: TxDate,
    pub description: String,
    #[serde(default)]
    pub details: String,
    /// Free-text payment channel (card, ACH, Zelle, cash, ...)
    #[serde(rename = "type", default)]
    pub payment_type: String,
    /// Non-negative; 0.0 means the amount is unknown
    pub amount: f64,
    pub direction: Direction,
    pub category: Category,
    #[serde(default)]
    pub notes: String,
    /// Groups transactions created by one extraction run
    pub batch_id: String,
}

impl Transaction {
    /// Create a transaction with a fresh id and no batch
    pub fn new(date: TxDate, description: &str, amount: f64, direction: Direction) -> Self {
        Self {
            id: new_id(),
            date,
            description: description.trim().to_string(),
            details: String::new(),
            payment_type: String::new(),
            amount: round_cents(amount.abs()),
            direction,
            category: Category::Uncategorized,
            notes: String::new(),
            batch_id: String::new(),
        }
    }

    pub fn with_details(mut self, details: &str) -> Self {
        self.details = details.trim().to_string();
        self
    }

    pub fn with_payment_type(mut self, payment_type: &str) -> Self {
        self.payment_type = payment_type.trim().to_string();
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn has_amount(&self) -> bool {
        self.amount > 0.0
    }

    /// One-line human summary used in replies
    pub fn summary(&self) -> String {
        let amount = if self.has_amount() {
            format!("${:.2}", self.amount)
        } else {
            "unknown amount".to_string()
        };
        let date = match self.date {
            TxDate::Known(d) => d.format("%Y-%m-%d").to_string(),
            TxDate::Unknown => "unknown date".to_string(),
        };
        format!(
            "{} {} on {} ({})",
            self.description,
            amount,
            date,
            self.direction.label()
        )
    }
}

/// Generate a new opaque identifier
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Round a money amount to cents
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Transactions produced by one extraction call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionBatch {
    pub batch_id: String,
    pub source_text: String,
    pub transaction_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ExtractionBatch {
    pub fn new(batch_id: &str, source_text: &str, transactions: &[Transaction]) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            source_text: source_text.to_string(),
            transaction_ids: transactions.iter().map(|t| t.id.clone()).collect(),
            created_at: Utc::now(),
        }
    }
}

/// Processing status of a bulk chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Pending,
    Processing,
    Success,
    Error,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// A slice of bulk text believed to hold whole transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub status: ChunkStatus,
    pub error: Option<String>,
    pub transactions: Vec<Transaction>,
}

impl Chunk {
    pub fn new(index: usize, text: &str) -> Self {
        Self {
            index,
            text: text.to_string(),
            status: ChunkStatus::Pending,
            error: None,
            transactions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parse_is_strict() {
        assert_eq!("in".parse::<Direction>().unwrap(), Direction::In);
        assert_eq!(" OUT ".parse::<Direction>().unwrap(), Direction::Out);
        assert!("income".parse::<Direction>().is_err());
    }

    #[test]
    fn test_tx_date_round_trip() {
        let d: TxDate = "2025-04-13".parse().unwrap();
        assert_eq!(d.to_string(), "2025-04-13");
        assert_eq!("unknown".parse::<TxDate>().unwrap(), TxDate::Unknown);
        assert!("04/13/2025".parse::<TxDate>().is_err());
        assert!("2025-4-3".parse::<TxDate>().is_err());
    }

    #[test]
    fn test_transaction_serializes_wire_names() {
        let tx = Transaction::new(TxDate::Unknown, "Coffee", 4.5, Direction::Out)
            .with_payment_type("card");
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "card");
        assert_eq!(json["date"], "unknown");
        assert_eq!(json["direction"], "OUT");
        assert_eq!(json["category"], "uncategorized");
        assert!(json.get("batchId").is_some());
    }

    #[test]
    fn test_new_transaction_normalizes_amount() {
        let tx = Transaction::new(TxDate::Unknown, "  Refund ", -12.346, Direction::In);
        assert_eq!(tx.amount, 12.35);
        assert_eq!(tx.description, "Refund");
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("Dining".parse::<Category>().unwrap(), Category::Dining);
        assert!("snacks".parse::<Category>().is_err());
    }
}
